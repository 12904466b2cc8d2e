//! `POST /triggers/{id}/events` (spec §4.8, §6): webhook ingress.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use tracing::instrument;
use zerg_common::{CoreError, TriggerId};
use zerg_runtime::trigger::WebhookRequest;

use crate::error::ApiError;
use crate::state::AppState;
use crate::types::ErrorBody;

/// Validation order is timestamp -> signature -> active; any failure is a
/// 401 with no side effect (spec §4.8).
#[utoipa::path(
    post,
    path = "/triggers/{id}/events",
    responses(
        (status = 200, description = "Trigger fired, run dispatched"),
        (status = 401, description = "Missing/invalid headers, stale timestamp, bad signature, or inactive trigger", body = ErrorBody),
        (status = 404, description = "Trigger not found"),
    ),
    tag = "triggers"
)]
#[instrument(skip(state, headers, body))]
pub async fn ingest_event(
    State(state): State<AppState>,
    Path(raw_id): Path<uuid::Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let trigger_id = TriggerId(raw_id);

    let timestamp_header = headers
        .get("x-zerg-timestamp")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| CoreError::Auth("missing X-Zerg-Timestamp header".to_string()))?;
    let signature_header = headers
        .get("x-zerg-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| CoreError::Auth("missing X-Zerg-Signature header".to_string()))?;

    state
        .trigger_ingress
        .ingest(trigger_id, WebhookRequest { timestamp_header, signature_header, body: &body })
        .await?;

    Ok(StatusCode::OK)
}
