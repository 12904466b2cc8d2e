//! Request/response DTOs for the REST surface (spec §6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use zerg_common::{AgentId, ExecutionId, RunId, RunStatus, RunTrigger};

#[derive(Debug, Deserialize, ToSchema)]
pub struct TaskRequest {
    /// Overrides the agent's configured `task_instructions` for this run.
    pub task: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskResponse {
    pub run_id: RunId,
    pub status: RunStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ThreadMessageRequest {
    pub content: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RunSummary {
    pub id: RunId,
    pub agent_id: AgentId,
    pub status: RunStatus,
    pub trigger: RunTrigger,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub summary: Option<String>,
}

impl From<zerg_common::AgentRun> for RunSummary {
    fn from(run: zerg_common::AgentRun) -> Self {
        Self {
            id: run.id,
            agent_id: run.agent_id,
            status: run.status,
            trigger: run.trigger,
            started_at: run.started_at,
            finished_at: run.finished_at,
            error: run.error,
            summary: run.summary,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RunListResponse {
    pub runs: Vec<RunSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ExecutionResponse {
    pub execution_id: ExecutionId,
    pub status: zerg_common::ExecutionStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    pub code: Option<String>,
    pub timestamp: DateTime<Utc>,
}
