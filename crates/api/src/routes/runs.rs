//! `POST /runs/{id}/cancel` (spec §4.5, §8 scenario 6). Not part of the
//! literal REST table in spec §6, but required by the cancellation scenario
//! and §4.5's `CancelRun(run_id)` operation, so it's exposed here alongside
//! the table's routes rather than only reachable over the WebSocket hub.

use axum::extract::{Path, State};
use axum::Json;
use tracing::instrument;
use zerg_common::{CoreError, RunId, RunStatus};

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::TaskResponse;

/// Flips the run's cooperative cancellation flag, the run-level analogue of
/// `workflows::cancel_execution`'s `active_executions` lookup. The run is
/// only reachable here while its `TaskRunner::dispatch` call is in flight.
#[utoipa::path(
    post,
    path = "/runs/{id}/cancel",
    responses(
        (status = 200, description = "Cancel requested", body = TaskResponse),
        (status = 404, description = "No in-flight run with that id"),
    ),
    tag = "agents"
)]
#[instrument(skip(state))]
pub async fn cancel_run(
    State(state): State<AppState>,
    Path(raw_id): Path<uuid::Uuid>,
) -> Result<Json<TaskResponse>, ApiError> {
    let run_id = RunId(raw_id);
    if state.task_runner.cancel_run(run_id) {
        Ok(Json(TaskResponse { run_id, status: RunStatus::Running }))
    } else {
        Err(CoreError::NotFound(format!("no in-flight run {run_id}")).into())
    }
}
