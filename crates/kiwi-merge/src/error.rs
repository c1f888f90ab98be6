use kiwi_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Ai(#[from] kiwi_ai::AiError),

    #[error(transparent)]
    Store(#[from] kiwi_store::StoreError),

    #[error("operation cancelled")]
    Cancelled,
}

impl MergeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            MergeError::Ai(e) => e.kind(),
            MergeError::Store(e) => e.kind(),
            MergeError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, MergeError>;
