use serde_json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Failure reported by any of the three collaborators (records, attachments, events).
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Acknowledgment error: {0}")]
    Acknowledgment(String),

    #[error("Event sink closed")]
    Closed,
}
