use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<StorageError> for zerg_common::CoreError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => zerg_common::CoreError::NotFound(msg),
            other => zerg_common::CoreError::Persistence(other.to_string()),
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
