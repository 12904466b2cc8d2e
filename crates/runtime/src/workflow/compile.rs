//! Compiles a workflow canvas into a validated DAG (spec §4.6 "Compilation").
//!
//! Grounded on the teacher's `WorkflowBuilder`/`WorkflowGraph` in
//! `agent-network/src/workflow/builder.rs`: a `petgraph::DiGraph` keyed by
//! node id, with a side table mapping node ids to graph indices so edges
//! can be added before every node is known to exist.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use zerg_common::{AgentId, Workflow, WorkflowNode, WorkflowNodeKind};

use crate::tools::ToolRegistry;

pub struct CompiledWorkflow {
    pub graph: DiGraph<WorkflowNode, Option<String>>,
    pub node_index: HashMap<String, NodeIndex>,
    pub entry: NodeIndex,
}

impl CompiledWorkflow {
    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.node_index.get(id).map(|idx| &self.graph[*idx])
    }

    /// Direct predecessors of `idx`, each paired with the edge label taken
    /// to reach `idx` (used by `condition` nodes' branch routing).
    pub fn predecessors(&self, idx: NodeIndex) -> Vec<(NodeIndex, Option<String>)> {
        self.graph
            .edges_directed(idx, petgraph::Direction::Incoming)
            .map(|e| (e.source(), e.weight().clone()))
            .collect()
    }

    pub fn successors(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        self.graph
            .edges_directed(idx, petgraph::Direction::Outgoing)
            .map(|e| e.target())
            .collect()
    }
}

/// Validates and compiles `workflow`. On any violation, returns every
/// failure found (spec: "`WorkflowValidationError` listing all failures").
pub fn compile(
    workflow: &Workflow,
    known_agent_ids: &HashSet<AgentId>,
    known_tools: &ToolRegistry,
) -> Result<CompiledWorkflow, Vec<String>> {
    let mut errors = Vec::new();
    let mut graph = DiGraph::<WorkflowNode, Option<String>>::new();
    let mut node_index = HashMap::new();

    for node in &workflow.nodes {
        if node_index.contains_key(&node.id) {
            errors.push(format!("duplicate node id: {}", node.id));
            continue;
        }
        match &node.kind {
            WorkflowNodeKind::Agent { agent_id } if !known_agent_ids.contains(agent_id) => {
                errors.push(format!("node {} references unknown agent {agent_id}", node.id));
            }
            WorkflowNodeKind::Tool { tool_name } if known_tools.get(tool_name).is_none() => {
                errors.push(format!("node {} references unknown tool {tool_name}", node.id));
            }
            _ => {}
        }
        let idx = graph.add_node(node.clone());
        node_index.insert(node.id.clone(), idx);
    }

    let mut inbound_count: HashMap<String, usize> = workflow.nodes.iter().map(|n| (n.id.clone(), 0)).collect();

    for edge in &workflow.edges {
        let from_idx = node_index.get(&edge.from).copied();
        let to_idx = node_index.get(&edge.to).copied();
        match (from_idx, to_idx) {
            (Some(from), Some(to)) => {
                graph.add_edge(from, to, edge.label.clone());
                *inbound_count.entry(edge.to.clone()).or_insert(0) += 1;
            }
            _ => {
                errors.push(format!("edge {} -> {} references a missing node", edge.from, edge.to));
            }
        }
    }

    let entry_nodes: Vec<&WorkflowNode> = workflow
        .nodes
        .iter()
        .filter(|n| n.is_entry)
        .collect();
    if entry_nodes.len() != 1 {
        errors.push(format!("expected exactly one entry node, found {}", entry_nodes.len()));
    }

    for node in &workflow.nodes {
        let is_trigger = matches!(node.kind, WorkflowNodeKind::Trigger);
        if !is_trigger && inbound_count.get(&node.id).copied().unwrap_or(0) == 0 {
            errors.push(format!("non-trigger node {} has no inbound edge", node.id));
        }
    }

    if toposort(&graph, None).is_err() {
        errors.push("workflow graph contains a cycle".to_string());
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    let entry = node_index[&entry_nodes[0].id];

    Ok(CompiledWorkflow { graph, node_index, entry })
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerg_common::{UserId, WorkflowEdge, WorkflowId};

    fn node(id: &str, kind: WorkflowNodeKind, is_entry: bool) -> WorkflowNode {
        WorkflowNode { id: id.to_string(), kind, is_entry }
    }

    fn edge(from: &str, to: &str) -> WorkflowEdge {
        WorkflowEdge { from: from.to_string(), to: to.to_string(), label: None }
    }

    fn base_workflow(nodes: Vec<WorkflowNode>, edges: Vec<WorkflowEdge>) -> Workflow {
        Workflow {
            id: WorkflowId::new(),
            owner_id: UserId::new(),
            name: "test".to_string(),
            nodes,
            edges,
            version: 1,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn valid_diamond_compiles() {
        let agent_id = AgentId::new();
        let agents = [agent_id].into_iter().collect();
        let tools = ToolRegistry::new();

        let workflow = base_workflow(
            vec![
                node("T", WorkflowNodeKind::Trigger, true),
                node("A", WorkflowNodeKind::Agent { agent_id }, false),
                node("B", WorkflowNodeKind::Agent { agent_id }, false),
                node("J", WorkflowNodeKind::Agent { agent_id }, false),
            ],
            vec![edge("T", "A"), edge("T", "B"), edge("A", "J"), edge("B", "J")],
        );

        let compiled = compile(&workflow, &agents, &tools).expect("diamond should compile");
        assert_eq!(compiled.graph.node_count(), 4);
    }

    #[test]
    fn cycle_is_rejected() {
        let agent_id = AgentId::new();
        let agents = [agent_id].into_iter().collect();
        let tools = ToolRegistry::new();

        let workflow = base_workflow(
            vec![
                node("T", WorkflowNodeKind::Trigger, true),
                node("A", WorkflowNodeKind::Agent { agent_id }, false),
                node("B", WorkflowNodeKind::Agent { agent_id }, false),
            ],
            vec![edge("T", "A"), edge("A", "B"), edge("B", "A")],
        );

        let errors = compile(&workflow, &agents, &tools).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("cycle")));
    }

    #[test]
    fn missing_entry_node_is_rejected() {
        let agent_id = AgentId::new();
        let agents = [agent_id].into_iter().collect();
        let tools = ToolRegistry::new();

        let workflow = base_workflow(
            vec![node("T", WorkflowNodeKind::Trigger, false)],
            vec![],
        );

        let errors = compile(&workflow, &agents, &tools).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("entry node")));
    }

    #[test]
    fn unknown_agent_reference_is_rejected() {
        let tools = ToolRegistry::new();
        let workflow = base_workflow(
            vec![
                node("T", WorkflowNodeKind::Trigger, true),
                node("A", WorkflowNodeKind::Agent { agent_id: AgentId::new() }, false),
            ],
            vec![edge("T", "A")],
        );

        let errors = compile(&workflow, &HashSet::new(), &tools).unwrap_err();
        assert!(errors.iter().any(|e| e.contains("unknown agent")));
    }
}
