//! `GET /health` — ambient liveness endpoint (SPEC_FULL.md §6).

use axum::Json;
use chrono::Utc;

use crate::types::HealthResponse;

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Server is alive", body = HealthResponse)),
    tag = "health"
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok".to_string(), version: env!("CARGO_PKG_VERSION").to_string(), timestamp: Utc::now() })
}
