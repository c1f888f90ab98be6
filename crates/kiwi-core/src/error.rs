use thiserror::Error;

/// Shared taxonomy so every crate's error enum can map to one place (§7).
/// The (out-of-scope) HTTP edge translates a `kind()` to a status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    TransientAi,
    TransientStore,
    FatalAi,
    FatalStore,
    Pipeline,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::TransientAi => "TRANSIENT_AI",
            ErrorKind::TransientStore => "TRANSIENT_STORE",
            ErrorKind::FatalAi => "FATAL_AI",
            ErrorKind::FatalStore => "FATAL_STORE",
            ErrorKind::Pipeline => "PIPELINE",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

#[derive(Debug, Error)]
pub enum KiwiError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),
}

impl KiwiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            KiwiError::Validation(_) => ErrorKind::Validation,
            KiwiError::NotFound(_) => ErrorKind::NotFound,
            KiwiError::Conflict(_) => ErrorKind::Conflict,
            KiwiError::Config(_) => ErrorKind::Internal,
            KiwiError::Cancelled => ErrorKind::Cancelled,
            KiwiError::Internal(_) => ErrorKind::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, KiwiError>;

/// Strips invalid UTF-8 and NUL bytes before anything is persisted (§7).
pub fn sanitize_text(input: &str) -> String {
    if input.contains('\0') {
        input.replace('\0', "")
    } else {
        input.to_string()
    }
}
