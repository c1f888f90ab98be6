use kiwi_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("advisory lock error: {0}")]
    Lock(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Database(e) => {
                if is_transient(e) {
                    ErrorKind::TransientStore
                } else {
                    ErrorKind::FatalStore
                }
            }
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Validation(_) => ErrorKind::Validation,
            StoreError::Lock(_) => ErrorKind::TransientStore,
        }
    }
}

/// Connection resets, pool timeouts, and serialization failures are worth
/// retrying; constraint violations and malformed queries are not.
pub fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::PoolClosed
    )
}

pub type Result<T> = std::result::Result<T, StoreError>;
