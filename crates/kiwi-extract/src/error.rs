use kiwi_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Ai(#[from] kiwi_ai::AiError),

    #[error(transparent)]
    Store(#[from] kiwi_store::StoreError),

    #[error("operation cancelled")]
    Cancelled,
}

impl ExtractError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExtractError::Ai(e) => e.kind(),
            ExtractError::Store(e) => e.kind(),
            ExtractError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
