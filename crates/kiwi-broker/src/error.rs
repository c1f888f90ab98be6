use kiwi_core::ErrorKind;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error(transparent)]
    Amqp(#[from] lapin::Error),

    #[error("broker channel closed")]
    Closed,

    #[error("operation cancelled")]
    Cancelled,
}

impl BrokerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BrokerError::Amqp(_) => ErrorKind::TransientStore,
            BrokerError::Closed => ErrorKind::TransientStore,
            BrokerError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn is_transient(&self) -> bool {
        !matches!(self, BrokerError::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, BrokerError>;
