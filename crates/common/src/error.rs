//! Shared error kinds (spec §7).
//!
//! `zerg-runtime` and `zerg-storage` wrap this with their own variants via
//! `#[from]`; `zerg-api` maps the whole tree to HTTP status codes at the
//! boundary instead of each layer guessing a status code for itself.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Auth(String),

    #[error("forbidden: {0}")]
    Authz(String),

    #[error("agent busy: {0}")]
    AgentBusy(String),

    #[error("workflow validation failed: {0:?}")]
    WorkflowValidation(Vec<String>),

    #[error("tool execution failed: {0}")]
    ToolExecution(String),

    #[error("model runner failed: {0}")]
    ModelRunner(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;
