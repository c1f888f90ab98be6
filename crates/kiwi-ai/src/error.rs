use kiwi_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider api error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("response parse error: {0}")]
    Parse(String),

    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("no handler registered for tool {0}")]
    NoSuchTool(String),
}

impl AiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AiError::Http(_) | AiError::Unavailable(_) | AiError::Timeout(_) => {
                ErrorKind::TransientAi
            }
            AiError::RateLimited { .. } => ErrorKind::TransientAi,
            AiError::Api { status, .. } if *status >= 500 => ErrorKind::TransientAi,
            AiError::Api { .. } => ErrorKind::FatalAi,
            AiError::Parse(_) => ErrorKind::FatalAi,
            AiError::Cancelled => ErrorKind::Cancelled,
            AiError::NoSuchTool(_) => ErrorKind::Validation,
        }
    }

    /// Whether a [`kiwi_core::retry::retry_with_cancel`] call should retry this error.
    pub fn is_transient(&self) -> bool {
        matches!(self.kind(), ErrorKind::TransientAi)
    }
}

pub type Result<T> = std::result::Result<T, AiError>;
