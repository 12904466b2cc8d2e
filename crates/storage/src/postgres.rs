//! Postgres-backed `PersistenceStore` (spec §4.9, C9).

use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use zerg_common::{
    Agent, AgentId, AgentRun, AgentStatus, ExecutionId, ExecutionState, ExecutionStatus, Message,
    MessageRole, RunId, RunStatus, RunTrigger, Thread, ThreadId, ThreadType,
    Trigger, TriggerId, Workflow, WorkflowExecution, WorkflowId,
};

use crate::error::{StorageError, StorageResult};
use crate::PersistenceStore;

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(database_url: &str, max_connections: u32) -> StorageResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    /// Exposed for integration tests that need direct pool access for setup
    /// and cleanup (teacher's `storage/tests/postgres_test.rs` idiom).
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn run_migrations(&self) -> StorageResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Other(e.into()))
    }
}

fn agent_status_to_str(s: AgentStatus) -> &'static str {
    match s {
        AgentStatus::Idle => "idle",
        AgentStatus::Running => "running",
        AgentStatus::Error => "error",
    }
}

fn agent_status_from_str(s: &str) -> StorageResult<AgentStatus> {
    match s {
        "idle" => Ok(AgentStatus::Idle),
        "running" => Ok(AgentStatus::Running),
        "error" => Ok(AgentStatus::Error),
        other => Err(StorageError::Other(anyhow::anyhow!("unknown agent status: {other}"))),
    }
}

fn thread_type_to_str(t: ThreadType) -> &'static str {
    match t {
        ThreadType::Manual => "manual",
        ThreadType::Schedule => "schedule",
        ThreadType::Trigger => "trigger",
        ThreadType::Chat => "chat",
        ThreadType::Workflow => "workflow",
    }
}

fn thread_type_from_str(s: &str) -> StorageResult<ThreadType> {
    match s {
        "manual" => Ok(ThreadType::Manual),
        "schedule" => Ok(ThreadType::Schedule),
        "trigger" => Ok(ThreadType::Trigger),
        "chat" => Ok(ThreadType::Chat),
        "workflow" => Ok(ThreadType::Workflow),
        other => Err(StorageError::Other(anyhow::anyhow!("unknown thread type: {other}"))),
    }
}

fn message_role_to_str(r: MessageRole) -> &'static str {
    match r {
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::System => "system",
        MessageRole::Tool => "tool",
    }
}

fn message_role_from_str(s: &str) -> StorageResult<MessageRole> {
    match s {
        "user" => Ok(MessageRole::User),
        "assistant" => Ok(MessageRole::Assistant),
        "system" => Ok(MessageRole::System),
        "tool" => Ok(MessageRole::Tool),
        other => Err(StorageError::Other(anyhow::anyhow!("unknown message role: {other}"))),
    }
}

fn run_status_to_str(s: RunStatus) -> &'static str {
    match s {
        RunStatus::Queued => "queued",
        RunStatus::Running => "running",
        RunStatus::Success => "success",
        RunStatus::Failed => "failed",
    }
}

fn run_status_from_str(s: &str) -> StorageResult<RunStatus> {
    match s {
        "queued" => Ok(RunStatus::Queued),
        "running" => Ok(RunStatus::Running),
        "success" => Ok(RunStatus::Success),
        "failed" => Ok(RunStatus::Failed),
        other => Err(StorageError::Other(anyhow::anyhow!("unknown run status: {other}"))),
    }
}

fn run_trigger_to_str(t: RunTrigger) -> &'static str {
    match t {
        RunTrigger::Manual => "manual",
        RunTrigger::Schedule => "schedule",
        RunTrigger::Api => "api",
        RunTrigger::Webhook => "webhook",
    }
}

fn run_trigger_from_str(s: &str) -> StorageResult<RunTrigger> {
    match s {
        "manual" => Ok(RunTrigger::Manual),
        "schedule" => Ok(RunTrigger::Schedule),
        "api" => Ok(RunTrigger::Api),
        "webhook" => Ok(RunTrigger::Webhook),
        other => Err(StorageError::Other(anyhow::anyhow!("unknown run trigger: {other}"))),
    }
}

fn execution_status_to_str(s: ExecutionStatus) -> &'static str {
    match s {
        ExecutionStatus::Running => "running",
        ExecutionStatus::Success => "success",
        ExecutionStatus::Failed => "failed",
    }
}

fn execution_status_from_str(s: &str) -> StorageResult<ExecutionStatus> {
    match s {
        "running" => Ok(ExecutionStatus::Running),
        "success" => Ok(ExecutionStatus::Success),
        "failed" => Ok(ExecutionStatus::Failed),
        other => Err(StorageError::Other(anyhow::anyhow!("unknown execution status: {other}"))),
    }
}

#[async_trait]
impl PersistenceStore for PostgresStore {
    async fn get_agent(&self, id: AgentId) -> StorageResult<Agent> {
        let row = sqlx::query(
            "SELECT id, owner_id, system_instructions, task_instructions, model, cron_schedule, \
             status, last_error, last_run_at, next_run_at, created_at, updated_at \
             FROM agents WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("agent {id}")))?;

        Ok(Agent {
            id: AgentId(row.try_get("id")?),
            owner_id: zerg_common::UserId(row.try_get("owner_id")?),
            system_instructions: row.try_get("system_instructions")?,
            task_instructions: row.try_get("task_instructions")?,
            model: row.try_get("model")?,
            cron_schedule: row.try_get("cron_schedule")?,
            status: agent_status_from_str(row.try_get::<String, _>("status")?.as_str())?,
            last_error: row.try_get("last_error")?,
            last_run_at: row.try_get("last_run_at")?,
            next_run_at: row.try_get("next_run_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn update_agent_status(
        &self,
        id: AgentId,
        status: AgentStatus,
        last_error: Option<String>,
        last_run_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> StorageResult<()> {
        sqlx::query(
            "UPDATE agents SET status = $1, last_error = $2, \
             last_run_at = COALESCE($3, last_run_at), updated_at = now() WHERE id = $4",
        )
        .bind(agent_status_to_str(status))
        .bind(last_error)
        .bind(last_run_at)
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_thread(&self, thread: &Thread) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO threads (id, agent_id, thread_type, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(thread.id.0)
        .bind(thread.agent_id.0)
        .bind(thread_type_to_str(thread.thread_type))
        .bind(thread.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_thread(&self, id: ThreadId) -> StorageResult<Thread> {
        let row = sqlx::query("SELECT id, agent_id, thread_type, created_at FROM threads WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("thread {id}")))?;

        Ok(Thread {
            id: ThreadId(row.try_get("id")?),
            agent_id: AgentId(row.try_get("agent_id")?),
            thread_type: thread_type_from_str(row.try_get::<String, _>("thread_type")?.as_str())?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn append_message(&self, message: &Message) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO messages (id, thread_id, role, content, tool_name, tool_call_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(message.id)
        .bind(message.thread_id.0)
        .bind(message_role_to_str(message.role))
        .bind(&message.content)
        .bind(message.tool_call.as_ref().map(|t| t.tool_name.clone()))
        .bind(message.tool_call.as_ref().map(|t| t.tool_call_id.clone()))
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn create_run(&self, run: &AgentRun) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO agent_runs (id, agent_id, thread_id, status, trigger, model, started_at, \
             finished_at, duration_ms, total_tokens, total_cost, error, summary) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(run.id.0)
        .bind(run.agent_id.0)
        .bind(run.thread_id.0)
        .bind(run_status_to_str(run.status))
        .bind(run_trigger_to_str(run.trigger))
        .bind(&run.model)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.duration_ms)
        .bind(run.total_tokens)
        .bind(run.total_cost)
        .bind(&run.error)
        .bind(&run.summary)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_run(
        &self,
        id: RunId,
        status: RunStatus,
        error: Option<String>,
        summary: Option<String>,
    ) -> StorageResult<()> {
        let finished_at = status.is_terminal().then(chrono::Utc::now);
        sqlx::query(
            "UPDATE agent_runs SET status = $1, error = $2, summary = COALESCE($3, summary), \
             finished_at = $4, duration_ms = EXTRACT(EPOCH FROM ($4 - started_at)) * 1000 \
             WHERE id = $5",
        )
        .bind(run_status_to_str(status))
        .bind(error)
        .bind(summary)
        .bind(finished_at)
        .bind(id.0)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_runs(&self, agent_id: AgentId, limit: i64) -> StorageResult<Vec<AgentRun>> {
        let rows = sqlx::query(
            "SELECT id, agent_id, thread_id, status, trigger, model, started_at, finished_at, \
             duration_ms, total_tokens, total_cost, error, summary \
             FROM agent_runs WHERE agent_id = $1 ORDER BY started_at DESC LIMIT $2",
        )
        .bind(agent_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(AgentRun {
                    id: RunId(row.try_get("id")?),
                    agent_id: AgentId(row.try_get("agent_id")?),
                    thread_id: ThreadId(row.try_get("thread_id")?),
                    status: run_status_from_str(row.try_get::<String, _>("status")?.as_str())?,
                    trigger: run_trigger_from_str(row.try_get::<String, _>("trigger")?.as_str())?,
                    model: row.try_get("model")?,
                    started_at: row.try_get("started_at")?,
                    finished_at: row.try_get("finished_at")?,
                    duration_ms: row.try_get("duration_ms")?,
                    total_tokens: row.try_get("total_tokens")?,
                    total_cost: row.try_get("total_cost")?,
                    error: row.try_get("error")?,
                    summary: row.try_get("summary")?,
                })
            })
            .collect()
    }

    async fn start_run(&self, run: &AgentRun, opening_message: &Message) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO agent_runs (id, agent_id, thread_id, status, trigger, model, started_at, \
             finished_at, duration_ms, total_tokens, total_cost, error, summary) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)",
        )
        .bind(run.id.0)
        .bind(run.agent_id.0)
        .bind(run.thread_id.0)
        .bind(run_status_to_str(run.status))
        .bind(run_trigger_to_str(run.trigger))
        .bind(&run.model)
        .bind(run.started_at)
        .bind(run.finished_at)
        .bind(run.duration_ms)
        .bind(run.total_tokens)
        .bind(run.total_cost)
        .bind(&run.error)
        .bind(&run.summary)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO messages (id, thread_id, role, content, tool_name, tool_call_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(opening_message.id)
        .bind(opening_message.thread_id.0)
        .bind(message_role_to_str(opening_message.role))
        .bind(&opening_message.content)
        .bind(opening_message.tool_call.as_ref().map(|t| t.tool_name.clone()))
        .bind(opening_message.tool_call.as_ref().map(|t| t.tool_call_id.clone()))
        .bind(opening_message.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE agents SET status = 'running', updated_at = now() WHERE id = $1")
            .bind(run.agent_id.0)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_trigger(&self, id: TriggerId) -> StorageResult<Trigger> {
        let row = sqlx::query("SELECT id, agent_id, secret, active FROM triggers WHERE id = $1")
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("trigger {id}")))?;

        Ok(Trigger {
            id: TriggerId(row.try_get("id")?),
            agent_id: AgentId(row.try_get("agent_id")?),
            secret: row.try_get("secret")?,
            active: row.try_get("active")?,
        })
    }

    async fn get_workflow(&self, id: WorkflowId) -> StorageResult<Workflow> {
        let row = sqlx::query(
            "SELECT id, owner_id, name, nodes, edges, version, created_at, updated_at \
             FROM workflows WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("workflow {id}")))?;

        let nodes_json: serde_json::Value = row.try_get("nodes")?;
        let edges_json: serde_json::Value = row.try_get("edges")?;

        Ok(Workflow {
            id: WorkflowId(row.try_get("id")?),
            owner_id: zerg_common::UserId(row.try_get("owner_id")?),
            name: row.try_get("name")?,
            nodes: serde_json::from_value(nodes_json).map_err(|e| StorageError::Other(e.into()))?,
            edges: serde_json::from_value(edges_json).map_err(|e| StorageError::Other(e.into()))?,
            version: row.try_get("version")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn persist_execution_checkpoint(&self, execution: &WorkflowExecution) -> StorageResult<()> {
        let state_json = serde_json::to_value(&execution.state).map_err(|e| StorageError::Other(e.into()))?;
        let spawned_json = serde_json::to_value(&execution.spawned_run_ids).map_err(|e| StorageError::Other(e.into()))?;

        sqlx::query(
            "INSERT INTO workflow_executions \
             (id, workflow_id, workflow_version, status, state, error, spawned_run_ids, started_at, finished_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             ON CONFLICT (id) DO UPDATE SET \
             status = EXCLUDED.status, state = EXCLUDED.state, error = EXCLUDED.error, \
             spawned_run_ids = EXCLUDED.spawned_run_ids, finished_at = EXCLUDED.finished_at",
        )
        .bind(execution.id.0)
        .bind(execution.workflow_id.0)
        .bind(execution.workflow_version)
        .bind(execution_status_to_str(execution.status))
        .bind(state_json)
        .bind(&execution.error)
        .bind(spawned_json)
        .bind(execution.started_at)
        .bind(execution.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_execution(&self, id: ExecutionId) -> StorageResult<WorkflowExecution> {
        let row = sqlx::query(
            "SELECT id, workflow_id, workflow_version, status, state, error, spawned_run_ids, \
             started_at, finished_at FROM workflow_executions WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StorageError::NotFound(format!("workflow execution {id}")))?;

        let state_json: serde_json::Value = row.try_get("state")?;
        let spawned_json: serde_json::Value = row.try_get("spawned_run_ids")?;

        Ok(WorkflowExecution {
            id: ExecutionId(row.try_get("id")?),
            workflow_id: WorkflowId(row.try_get("workflow_id")?),
            workflow_version: row.try_get("workflow_version")?,
            status: execution_status_from_str(row.try_get::<String, _>("status")?.as_str())?,
            state: serde_json::from_value::<ExecutionState>(state_json).map_err(|e| StorageError::Other(e.into()))?,
            error: row.try_get("error")?,
            spawned_run_ids: serde_json::from_value(spawned_json).map_err(|e| StorageError::Other(e.into()))?,
            started_at: row.try_get("started_at")?,
            finished_at: row.try_get("finished_at")?,
        })
    }

    async fn list_scheduled_agents(&self) -> StorageResult<Vec<Agent>> {
        let rows = sqlx::query(
            "SELECT id, owner_id, system_instructions, task_instructions, model, cron_schedule, \
             status, last_error, last_run_at, next_run_at, created_at, updated_at \
             FROM agents WHERE cron_schedule IS NOT NULL",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Agent {
                    id: AgentId(row.try_get("id")?),
                    owner_id: zerg_common::UserId(row.try_get("owner_id")?),
                    system_instructions: row.try_get("system_instructions")?,
                    task_instructions: row.try_get("task_instructions")?,
                    model: row.try_get("model")?,
                    cron_schedule: row.try_get("cron_schedule")?,
                    status: agent_status_from_str(row.try_get::<String, _>("status")?.as_str())?,
                    last_error: row.try_get("last_error")?,
                    last_run_at: row.try_get("last_run_at")?,
                    next_run_at: row.try_get("next_run_at")?,
                    created_at: row.try_get("created_at")?,
                    updated_at: row.try_get("updated_at")?,
                })
            })
            .collect()
    }

    async fn update_agent_next_run_at(
        &self,
        id: AgentId,
        next_run_at: Option<chrono::DateTime<chrono::Utc>>,
    ) -> StorageResult<()> {
        sqlx::query("UPDATE agents SET next_run_at = $1, updated_at = now() WHERE id = $2")
            .bind(next_run_at)
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
