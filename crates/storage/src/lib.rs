//! Durable storage for the agent runtime (spec §4.9, C9).
//!
//! `PersistenceStore` is the narrow interface the rest of the system talks
//! to; `postgres::PostgresStore` is the only implementation we ship, but
//! keeping the trait separate lets `zerg-runtime` and `zerg-api` depend on
//! an interface rather than a concrete pool type, matching the teacher's
//! adapter-per-backend layout in `storage/src/lib.rs`.

pub mod error;
pub mod postgres;

pub use error::{StorageError, StorageResult};
pub use postgres::PostgresStore;

use async_trait::async_trait;
use zerg_common::{Agent, AgentId, AgentRun, AgentStatus, Message, RunId, RunStatus, Thread, ThreadId, Trigger, TriggerId, Workflow, WorkflowExecution, WorkflowId};

/// The narrow persistence interface named in spec §4.9. All writes that must
/// be atomic with each other (notably `create_run` + `append_message` +
/// `update_agent_status` at run start) happen within one call so the
/// implementation can wrap them in a single transaction.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn get_agent(&self, id: AgentId) -> StorageResult<Agent>;
    /// `last_run_at` is only bumped when the caller passes `Some` (run
    /// completion); transitions to `running` leave it untouched.
    async fn update_agent_status(
        &self,
        id: AgentId,
        status: AgentStatus,
        last_error: Option<String>,
        last_run_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> StorageResult<()>;

    async fn create_thread(&self, thread: &Thread) -> StorageResult<()>;
    /// Used by the Topic Manager's authorizer to resolve a thread's owning
    /// agent before checking ownership (spec §4.2 subscription auth).
    async fn get_thread(&self, id: ThreadId) -> StorageResult<Thread>;
    async fn append_message(&self, message: &Message) -> StorageResult<()>;

    async fn create_run(&self, run: &AgentRun) -> StorageResult<()>;
    async fn update_run(
        &self,
        id: RunId,
        status: RunStatus,
        error: Option<String>,
        summary: Option<String>,
    ) -> StorageResult<()>;
    async fn list_runs(&self, agent_id: AgentId, limit: i64) -> StorageResult<Vec<AgentRun>>;

    /// Atomically starts a run: persists the run row, appends the opening
    /// message, and flips the agent to `running` in one transaction.
    async fn start_run(&self, run: &AgentRun, opening_message: &Message) -> StorageResult<()>;

    async fn get_trigger(&self, id: TriggerId) -> StorageResult<Trigger>;
    async fn get_workflow(&self, id: WorkflowId) -> StorageResult<Workflow>;

    async fn persist_execution_checkpoint(&self, execution: &WorkflowExecution) -> StorageResult<()>;
    async fn get_execution(&self, id: zerg_common::ExecutionId) -> StorageResult<WorkflowExecution>;

    /// All agents with a non-null `cron_schedule`, for the Scheduler's
    /// startup enumeration (spec §4.7).
    async fn list_scheduled_agents(&self) -> StorageResult<Vec<Agent>>;
    /// Writes the job's next fire time to the agent row (spec §4.7: "On
    /// agent upsert with a cron schedule ... `next_run_at` is written to the
    /// agent row").
    async fn update_agent_next_run_at(
        &self,
        id: AgentId,
        next_run_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> StorageResult<()>;
}
