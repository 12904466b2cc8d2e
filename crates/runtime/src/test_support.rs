//! An in-memory `PersistenceStore` double for unit tests, in place of
//! spinning up Postgres. Mirrors the shape of `zerg_storage::PostgresStore`
//! closely enough that swapping one for the other in a test is a one-line
//! change.
#![cfg(test)]

use std::sync::Mutex;

use async_trait::async_trait;
use zerg_common::{
    Agent, AgentId, AgentRun, AgentStatus, ExecutionId, Message, RunId, RunStatus, Thread,
    ThreadId, Trigger, TriggerId, Workflow, WorkflowExecution, WorkflowId,
};
use zerg_storage::{PersistenceStore, StorageError, StorageResult};

#[derive(Default)]
pub struct InMemoryStore {
    agents: Mutex<std::collections::HashMap<AgentId, Agent>>,
    threads: Mutex<std::collections::HashMap<ThreadId, Thread>>,
    messages: Mutex<Vec<Message>>,
    runs: Mutex<std::collections::HashMap<RunId, AgentRun>>,
    triggers: Mutex<std::collections::HashMap<TriggerId, Trigger>>,
    workflows: Mutex<std::collections::HashMap<WorkflowId, Workflow>>,
    executions: Mutex<std::collections::HashMap<ExecutionId, WorkflowExecution>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed_agent(&self, agent: Agent) {
        self.agents.lock().unwrap().insert(agent.id, agent);
    }

    pub fn seed_trigger(&self, trigger: Trigger) {
        self.triggers.lock().unwrap().insert(trigger.id, trigger);
    }

    pub fn seed_workflow(&self, workflow: Workflow) {
        self.workflows.lock().unwrap().insert(workflow.id, workflow);
    }
}

#[async_trait]
impl PersistenceStore for InMemoryStore {
    async fn get_agent(&self, id: AgentId) -> StorageResult<Agent> {
        self.agents
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("agent {id}")))
    }

    async fn update_agent_status(
        &self,
        id: AgentId,
        status: AgentStatus,
        last_error: Option<String>,
        last_run_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> StorageResult<()> {
        let mut agents = self.agents.lock().unwrap();
        let agent = agents.get_mut(&id).ok_or_else(|| StorageError::NotFound(format!("agent {id}")))?;
        agent.status = status;
        agent.last_error = last_error;
        if let Some(at) = last_run_at {
            agent.last_run_at = Some(at);
        }
        Ok(())
    }

    async fn create_thread(&self, thread: &Thread) -> StorageResult<()> {
        self.threads.lock().unwrap().insert(thread.id, thread.clone());
        Ok(())
    }

    async fn get_thread(&self, id: ThreadId) -> StorageResult<Thread> {
        self.threads
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("thread {id}")))
    }

    async fn append_message(&self, message: &Message) -> StorageResult<()> {
        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }

    async fn create_run(&self, run: &AgentRun) -> StorageResult<()> {
        self.runs.lock().unwrap().insert(run.id, run.clone());
        Ok(())
    }

    async fn update_run(
        &self,
        id: RunId,
        status: RunStatus,
        error: Option<String>,
        summary: Option<String>,
    ) -> StorageResult<()> {
        let mut runs = self.runs.lock().unwrap();
        let run = runs.get_mut(&id).ok_or_else(|| StorageError::NotFound(format!("run {id}")))?;
        run.status = status;
        run.error = error;
        if summary.is_some() {
            run.summary = summary;
        }
        if status.is_terminal() {
            run.finished_at = Some(chrono::Utc::now());
        }
        Ok(())
    }

    async fn list_runs(&self, agent_id: AgentId, limit: i64) -> StorageResult<Vec<AgentRun>> {
        let mut runs: Vec<AgentRun> = self
            .runs
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.agent_id == agent_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| std::cmp::Reverse(r.started_at));
        runs.truncate(limit as usize);
        Ok(runs)
    }

    async fn start_run(&self, run: &AgentRun, opening_message: &Message) -> StorageResult<()> {
        self.runs.lock().unwrap().insert(run.id, run.clone());
        self.messages.lock().unwrap().push(opening_message.clone());
        if let Some(agent) = self.agents.lock().unwrap().get_mut(&run.agent_id) {
            agent.status = AgentStatus::Running;
        }
        Ok(())
    }

    async fn get_trigger(&self, id: TriggerId) -> StorageResult<Trigger> {
        self.triggers
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("trigger {id}")))
    }

    async fn get_workflow(&self, id: WorkflowId) -> StorageResult<Workflow> {
        self.workflows
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("workflow {id}")))
    }

    async fn persist_execution_checkpoint(&self, execution: &WorkflowExecution) -> StorageResult<()> {
        self.executions.lock().unwrap().insert(execution.id, execution.clone());
        Ok(())
    }

    async fn get_execution(&self, id: ExecutionId) -> StorageResult<WorkflowExecution> {
        self.executions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("execution {id}")))
    }

    async fn list_scheduled_agents(&self) -> StorageResult<Vec<Agent>> {
        Ok(self
            .agents
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.cron_schedule.is_some())
            .cloned()
            .collect())
    }

    async fn update_agent_next_run_at(
        &self,
        id: AgentId,
        next_run_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> StorageResult<()> {
        let mut agents = self.agents.lock().unwrap();
        let agent = agents.get_mut(&id).ok_or_else(|| StorageError::NotFound(format!("agent {id}")))?;
        agent.next_run_at = next_run_at;
        Ok(())
    }
}
