use kiwi_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("unsupported extension: {0}")]
    UnsupportedExtension(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("ai capability error: {0}")]
    Ai(#[from] kiwi_ai::AiError),

    #[error("operation cancelled")]
    Cancelled,
}

impl LoaderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoaderError::UnsupportedExtension(_) => ErrorKind::Validation,
            LoaderError::Decode(_) => ErrorKind::Pipeline,
            LoaderError::Ai(e) => e.kind(),
            LoaderError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, LoaderError::Ai(e) if e.is_transient())
    }
}

pub type Result<T> = std::result::Result<T, LoaderError>;
