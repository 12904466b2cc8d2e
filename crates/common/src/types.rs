//! Domain entities for the agent runtime (spec §3).
//!
//! Ownership: Runs and Threads are owned by their Agent (delete-cascades).
//! WorkflowExecutions are owned by their Workflow. Messages are owned by
//! their Thread.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }
    };
}

id_newtype!(AgentId);
id_newtype!(ThreadId);
id_newtype!(RunId);
id_newtype!(WorkflowId);
id_newtype!(ExecutionId);
id_newtype!(TriggerId);
id_newtype!(UserId);

/// Status of an [`Agent`]. Invariant: a single agent has at most one active
/// run at any instant, enforced by the Agent Lock Manager (C4), not by this
/// enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Running,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Agent {
    pub id: AgentId,
    pub owner_id: UserId,
    pub system_instructions: String,
    pub task_instructions: String,
    pub model: String,
    /// Standard 5-field cron expression. `None` disables scheduling.
    pub cron_schedule: Option<String>,
    pub status: AgentStatus,
    pub last_error: Option<String>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    /// True once an agent has somewhere to resume from; fresh agents always
    /// start idle with no schedule.
    pub fn is_scheduled(&self) -> bool {
        self.cron_schedule.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ThreadType {
    Manual,
    Schedule,
    Trigger,
    Chat,
    /// Thread created to back one node of a workflow execution (spec §4.6).
    Workflow,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Thread {
    pub id: ThreadId,
    pub agent_id: AgentId,
    pub thread_type: ThreadType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
    Tool,
}

/// Tool-call metadata carried by `assistant` (requesting) and `tool`
/// (responding) messages.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ToolCallMeta {
    pub tool_name: String,
    pub tool_call_id: String,
}

/// Immutable once persisted.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Message {
    pub id: Uuid,
    pub thread_id: ThreadId,
    pub role: MessageRole,
    pub content: String,
    pub tool_call: Option<ToolCallMeta>,
    /// Monotonic per-thread ordering key; messages are totally ordered by
    /// this timestamp (spec §3 invariant).
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(thread_id: ThreadId, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            thread_id,
            role,
            content: content.into(),
            tool_call: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Success,
    Failed,
}

impl RunStatus {
    /// Status transitions only move forward through the partial order
    /// queued → running → {success, failed} (spec §3 invariant).
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Queued, Running) | (Queued, Success) | (Queued, Failed) | (Running, Success) | (Running, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RunStatus::Success | RunStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    Manual,
    Schedule,
    Api,
    Webhook,
}

/// Immutable log of one agent execution (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AgentRun {
    pub id: RunId,
    pub agent_id: AgentId,
    pub thread_id: ThreadId,
    pub status: RunStatus,
    pub trigger: RunTrigger,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub total_tokens: Option<i64>,
    pub total_cost: Option<f64>,
    pub error: Option<String>,
    pub summary: Option<String>,
}

impl AgentRun {
    pub fn new_queued(agent_id: AgentId, thread_id: ThreadId, model: String, trigger: RunTrigger) -> Self {
        Self {
            id: RunId::new(),
            agent_id,
            thread_id,
            status: RunStatus::Queued,
            trigger,
            model,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            total_tokens: None,
            total_cost: None,
            error: None,
            summary: None,
        }
    }
}

/// Node types of a workflow canvas (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowNodeKind {
    Trigger,
    Agent { agent_id: AgentId },
    Tool { tool_name: String },
    Condition { expression: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowNode {
    pub id: String,
    pub kind: WorkflowNodeKind,
    pub is_entry: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowEdge {
    pub from: String,
    pub to: String,
    /// For `condition` source nodes, the branch label this edge is taken
    /// under ("true" | "false"); `None` for unconditional edges.
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Workflow {
    pub id: WorkflowId,
    pub owner_id: UserId,
    pub name: String,
    pub nodes: Vec<WorkflowNode>,
    pub edges: Vec<WorkflowEdge>,
    /// Bumped on every canvas edit so in-flight executions keep referencing
    /// the shape they were compiled from.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
}

/// Shared execution state, mutated only by the engine's merge step (spec
/// §4.6 / §5).
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct ExecutionState {
    pub node_outputs: std::collections::BTreeMap<String, serde_json::Value>,
    pub completed_nodes: std::collections::BTreeSet<String>,
}

impl ExecutionState {
    /// Merge a node's partial update. `node_outputs` merges by key (a
    /// node_id appears only once, so last-writer-wins is structurally
    /// impossible); `completed_nodes` is set-union.
    pub fn merge(&mut self, update: PartialUpdate) {
        for (node_id, output) in update.node_outputs {
            self.node_outputs.insert(node_id, output);
        }
        for node_id in update.completed_nodes {
            self.completed_nodes.insert(node_id);
        }
    }
}

/// The value a completed workflow node task returns; never mutates shared
/// state directly (spec §5 shared-resource policy).
#[derive(Debug, Clone, Default)]
pub struct PartialUpdate {
    pub node_outputs: std::collections::BTreeMap<String, serde_json::Value>,
    pub completed_nodes: Vec<String>,
    /// Set by an agent node: the `RunId` it dispatched, recorded onto
    /// `WorkflowExecution::spawned_run_ids` by the engine rather than by
    /// `ExecutionState::merge`, since that id lives on the execution, not
    /// its shared node state.
    pub spawned_run_id: Option<RunId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub workflow_version: i64,
    pub status: ExecutionStatus,
    pub state: ExecutionState,
    pub error: Option<String>,
    pub spawned_run_ids: Vec<RunId>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Trigger {
    pub id: TriggerId,
    pub agent_id: AgentId,
    pub secret: String,
    pub active: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_id_roundtrips_through_display() {
        let id = AgentId::new();
        let rendered = id.to_string();
        let parsed: Uuid = rendered.parse().unwrap();
        assert_eq!(parsed, id.0);
    }

    #[test]
    fn run_status_transitions_only_move_forward() {
        assert!(RunStatus::Queued.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Success));
        assert!(!RunStatus::Success.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Queued));
    }

    #[test]
    fn execution_state_merge_is_set_union_on_completed_nodes() {
        let mut state = ExecutionState::default();
        state.merge(PartialUpdate {
            node_outputs: [("a".to_string(), serde_json::json!(1))].into(),
            completed_nodes: vec!["a".to_string()],
            spawned_run_id: None,
        });
        state.merge(PartialUpdate {
            node_outputs: [("b".to_string(), serde_json::json!(2))].into(),
            completed_nodes: vec!["b".to_string()],
            spawned_run_id: None,
        });
        assert_eq!(state.completed_nodes.len(), 2);
        assert_eq!(state.node_outputs.len(), 2);
    }
}
