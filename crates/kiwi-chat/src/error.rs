use kiwi_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] kiwi_store::StoreError),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Ai(#[from] kiwi_ai::AiError),

    #[error("operation cancelled")]
    Cancelled,
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::Validation(_) => ErrorKind::Validation,
            ChatError::NotFound(_) => ErrorKind::NotFound,
            ChatError::Conflict(_) => ErrorKind::Conflict,
            ChatError::Store(e) => e.kind(),
            ChatError::Database(e) => {
                if kiwi_store::error::is_transient(e) {
                    ErrorKind::TransientStore
                } else {
                    ErrorKind::FatalStore
                }
            }
            ChatError::Ai(e) => e.kind(),
            ChatError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientStore | ErrorKind::TransientAi)
    }
}

pub type Result<T> = std::result::Result<T, ChatError>;
