//! `POST /agents/{id}/task` and `GET /agents/{id}/runs` (spec §6).

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use tracing::instrument;
use zerg_common::{AgentId, RunTrigger, ThreadType};
use zerg_runtime::task_runner::RunRequest;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{RunListResponse, RunSummary, TaskRequest, TaskResponse};

/// Dispatches a manual run (spec: "Emits RUN_CREATED, RUN_UPDATED").
#[utoipa::path(
    post,
    path = "/agents/{id}/task",
    request_body = TaskRequest,
    responses(
        (status = 200, description = "Run dispatched", body = TaskResponse),
        (status = 404, description = "Agent not found"),
        (status = 409, description = "Agent already has a run in flight"),
    ),
    tag = "agents"
)]
#[instrument(skip(state, req))]
pub async fn dispatch_task(
    State(state): State<AppState>,
    Path(raw_id): Path<uuid::Uuid>,
    Json(req): Json<TaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let agent_id = AgentId(raw_id);
    let dispatch = RunRequest {
        agent_id,
        thread_id: None,
        thread_type: ThreadType::Manual,
        trigger: RunTrigger::Api,
        task_override: req.task,
    };
    let outcome = state.task_runner.dispatch(dispatch, tokio_util::sync::CancellationToken::new()).await?;
    Ok(Json(TaskResponse { run_id: outcome.run_id, status: outcome.status }))
}

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

#[utoipa::path(
    get,
    path = "/agents/{id}/runs",
    params(("limit" = Option<i64>, Query, description = "Max rows to return")),
    responses((status = 200, description = "Run history, most recent first", body = RunListResponse)),
    tag = "agents"
)]
#[instrument(skip(state))]
pub async fn list_runs(
    State(state): State<AppState>,
    Path(raw_id): Path<uuid::Uuid>,
    Query(params): Query<RunsQuery>,
) -> Result<Json<RunListResponse>, ApiError> {
    let agent_id = AgentId(raw_id);
    let runs = state.store.list_runs(agent_id, params.limit).await?;
    Ok(Json(RunListResponse { runs: runs.into_iter().map(RunSummary::from).collect() }))
}
