use thiserror::Error;
use zerg_common::CoreError;

#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] zerg_storage::StorageError),

    #[error("agent {0} is busy")]
    AgentBusy(zerg_common::AgentId),
}

impl From<RuntimeError> for CoreError {
    fn from(err: RuntimeError) -> Self {
        match err {
            RuntimeError::Core(e) => e,
            RuntimeError::Storage(e) => e.into(),
            RuntimeError::AgentBusy(id) => CoreError::AgentBusy(id.to_string()),
        }
    }
}

pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
