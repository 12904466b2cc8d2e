//! `POST /threads/{id}/messages` (spec §6): append a user message to an
//! existing chat thread and run the agent against it.

use axum::extract::{Path, State};
use axum::Json;
use tracing::instrument;
use zerg_common::{RunTrigger, ThreadId, ThreadType};
use zerg_runtime::task_runner::RunRequest;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::{TaskResponse, ThreadMessageRequest};

/// Emits `STREAM_*` and `THREAD_MESSAGE_CREATED` as the run progresses
/// (spec §6). The thread's owning agent is resolved from the thread row.
#[utoipa::path(
    post,
    path = "/threads/{id}/messages",
    request_body = ThreadMessageRequest,
    responses(
        (status = 200, description = "Run dispatched for this message", body = TaskResponse),
        (status = 404, description = "Thread not found"),
        (status = 409, description = "Agent already has a run in flight"),
    ),
    tag = "threads"
)]
#[instrument(skip(state, req))]
pub async fn post_message(
    State(state): State<AppState>,
    Path(raw_id): Path<uuid::Uuid>,
    Json(req): Json<ThreadMessageRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let thread_id = ThreadId(raw_id);
    let thread = state.store.get_thread(thread_id).await?;

    let dispatch = RunRequest {
        agent_id: thread.agent_id,
        thread_id: Some(thread_id),
        thread_type: ThreadType::Chat,
        trigger: RunTrigger::Api,
        task_override: Some(req.content),
    };
    let outcome = state.task_runner.dispatch(dispatch, tokio_util::sync::CancellationToken::new()).await?;
    Ok(Json(TaskResponse { run_id: outcome.run_id, status: outcome.status }))
}
