//! `POST /workflow-executions/{id}/start` and `.../cancel` (spec §6).

use std::collections::HashSet;

use axum::extract::{Path, State};
use axum::Json;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use zerg_common::{AgentId, CoreError, ExecutionId, WorkflowNodeKind};

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::ExecutionResponse;

/// Starts the Workflow Engine on an already-persisted execution row. The
/// HTTP response returns as soon as the engine is spawned; progress is
/// observed over `NODE_STATE`/`EXECUTION_FINISHED` on the execution's
/// WebSocket topic, not in this response body.
#[utoipa::path(
    post,
    path = "/workflow-executions/{id}/start",
    responses(
        (status = 200, description = "Execution started", body = ExecutionResponse),
        (status = 404, description = "Execution not found"),
        (status = 422, description = "Workflow failed DAG validation"),
    ),
    tag = "workflows"
)]
#[instrument(skip(state))]
pub async fn start_execution(
    State(state): State<AppState>,
    Path(raw_id): Path<uuid::Uuid>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    let id = ExecutionId(raw_id);
    if state.active_executions.contains_key(&id) {
        return Err(CoreError::Protocol(format!("execution {id} is already running")).into());
    }

    let execution = state.store.get_execution(id).await?;
    let workflow = state.store.get_workflow(execution.workflow_id).await?;

    let mut known_agent_ids: HashSet<AgentId> = HashSet::new();
    for node in &workflow.nodes {
        if let WorkflowNodeKind::Agent { agent_id } = &node.kind {
            let agent_id = *agent_id;
            if state.store.get_agent(agent_id).await.is_ok() {
                known_agent_ids.insert(agent_id);
            }
        }
    }

    let compiled = zerg_runtime::workflow::compile(&workflow, &known_agent_ids, &state.tools)
        .map_err(CoreError::WorkflowValidation)?;

    let cancel = CancellationToken::new();
    state.active_executions.insert(id, cancel.clone());

    let engine = state.workflow_engine.clone();
    let store = state.store.clone();
    let active_executions = state.active_executions.clone();
    tokio::spawn(async move {
        let result = engine
            .execute(&workflow, &compiled, execution, serde_json::json!({}), cancel)
            .await;
        active_executions.remove(&id);
        match result {
            Ok(_) => info!(execution_id = %id, "workflow execution finished"),
            Err(e) => warn!(execution_id = %id, error = %e, "workflow execution failed to persist"),
        }
        let _ = store;
    });

    Ok(Json(ExecutionResponse { execution_id: id, status: zerg_common::ExecutionStatus::Running }))
}

/// Cooperative cancel: flips the execution's `CancellationToken`, observed
/// by the engine between node dispatches (spec §5).
#[utoipa::path(
    post,
    path = "/workflow-executions/{id}/cancel",
    responses(
        (status = 200, description = "Cancel requested", body = ExecutionResponse),
        (status = 404, description = "No running execution with that id"),
    ),
    tag = "workflows"
)]
#[instrument(skip(state))]
pub async fn cancel_execution(
    State(state): State<AppState>,
    Path(raw_id): Path<uuid::Uuid>,
) -> Result<Json<ExecutionResponse>, ApiError> {
    let id = ExecutionId(raw_id);
    match state.active_executions.get(&id) {
        Some(cancel) => {
            cancel.cancel();
            Ok(Json(ExecutionResponse { execution_id: id, status: zerg_common::ExecutionStatus::Running }))
        }
        None => Err(CoreError::NotFound(format!("no running execution {id}")).into()),
    }
}
