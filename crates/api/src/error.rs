//! Maps `CoreError` (and its wrapped `RuntimeError`/`StorageError`) to the
//! HTTP status contracts in spec §7, at the one boundary that has to know
//! about status codes at all.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use zerg_common::CoreError;

use crate::types::ErrorBody;

pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl From<zerg_runtime::RuntimeError> for ApiError {
    fn from(err: zerg_runtime::RuntimeError) -> Self {
        Self(err.into())
    }
}

impl From<zerg_storage::StorageError> for ApiError {
    fn from(err: zerg_storage::StorageError) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            CoreError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            CoreError::Auth(_) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR"),
            CoreError::Authz(_) => (StatusCode::FORBIDDEN, "AUTHZ_ERROR"),
            CoreError::AgentBusy(_) => (StatusCode::CONFLICT, "AGENT_BUSY"),
            CoreError::WorkflowValidation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "WORKFLOW_VALIDATION"),
            CoreError::ToolExecution(_) => (StatusCode::INTERNAL_SERVER_ERROR, "TOOL_EXECUTION"),
            CoreError::ModelRunner(_) => (StatusCode::INTERNAL_SERVER_ERROR, "MODEL_RUNNER"),
            CoreError::Persistence(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PERSISTENCE"),
            CoreError::Protocol(_) => (StatusCode::BAD_REQUEST, "PROTOCOL"),
            CoreError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG"),
            CoreError::Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
        };
        let body = ErrorBody { error: self.0.to_string(), code: Some(code.to_string()), timestamp: Utc::now() };
        (status, Json(body)).into_response()
    }
}
