use stockroom_core::{event::DeliveryTag, StoreError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReliableDispatchError>;

#[derive(Debug, Error)]
pub enum ReliableDispatchError {
    #[error("Acknowledgment error: no locked delivery with tag {0}")]
    UnknownDelivery(DeliveryTag),

    #[error("Queue {0} is closed")]
    Closed(String),

    #[error("Publish failed on every queue: {0}")]
    FanoutFailed(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Payload error: {0}")]
    Payload(#[from] StoreError),
}

impl From<ReliableDispatchError> for StoreError {
    fn from(err: ReliableDispatchError) -> Self {
        match err {
            ReliableDispatchError::UnknownDelivery(_) => StoreError::Acknowledgment(err.to_string()),
            ReliableDispatchError::Closed(_) => StoreError::Closed,
            ReliableDispatchError::Payload(inner) => inner,
            other => StoreError::Backend(other.to_string()),
        }
    }
}
