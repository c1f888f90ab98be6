use kiwi_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Store(#[from] kiwi_store::StoreError),

    #[error(transparent)]
    Loader(#[from] kiwi_loader::LoaderError),

    #[error(transparent)]
    Extract(#[from] kiwi_extract::ExtractError),

    #[error(transparent)]
    Merge(#[from] kiwi_merge::MergeError),

    #[error(transparent)]
    Broker(#[from] kiwi_broker::BrokerError),

    #[error("project file {0} not found")]
    MissingProjectFile(i64),

    #[error("operation cancelled")]
    Cancelled,
}

impl WorkerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkerError::Store(e) => e.kind(),
            WorkerError::Loader(e) => e.kind(),
            WorkerError::Extract(e) => e.kind(),
            WorkerError::Merge(e) => e.kind(),
            WorkerError::Broker(e) => e.kind(),
            WorkerError::MissingProjectFile(_) => ErrorKind::NotFound,
            WorkerError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self.kind(), ErrorKind::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
