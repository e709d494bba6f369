use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use stockroom_core::StoreError;
use thiserror::Error;
use tracing::error;

pub type Result<T> = std::result::Result<T, SyncError>;

/// Outcome of a failed coordinator operation, mapped 1:1 onto an HTTP status.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Attachment write failed: {0}")]
    AttachmentWrite(StoreError),

    #[error("Attachment delete failed: {0}")]
    AttachmentDelete(StoreError),

    #[error("Record write failed: {0}")]
    RecordWrite(StoreError),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Only timeouts are worth retrying; everything else is terminal or already compensated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Timeout(_))
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SyncError::Validation(_) => StatusCode::BAD_REQUEST,
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::AttachmentWrite(_)
            | SyncError::AttachmentDelete(_)
            | SyncError::RecordWrite(_)
            | SyncError::Timeout(_)
            | SyncError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(retryable = self.is_retryable(), "request failed: {}", self);
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
