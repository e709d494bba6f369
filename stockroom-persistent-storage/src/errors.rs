use stockroom_core::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PersistentStorageError>;

#[derive(Debug, Error)]
pub enum PersistentStorageError {
    #[error("opendal {op} {key}: {source}")]
    Backend {
        op: &'static str,
        key: String,
        #[source]
        source: opendal::Error,
    },
    #[error("invalid backend configuration: {0}")]
    Config(String),
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("locator does not belong to this store: {0}")]
    ForeignLocator(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PersistentStorageError {
    pub(crate) fn backend(op: &'static str, key: &str, source: opendal::Error) -> Self {
        PersistentStorageError::Backend {
            op,
            key: key.to_string(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            PersistentStorageError::Backend { source, .. }
                if source.kind() == opendal::ErrorKind::NotFound
        )
    }
}

impl From<PersistentStorageError> for StoreError {
    fn from(err: PersistentStorageError) -> Self {
        match err {
            e @ PersistentStorageError::Backend { .. } if e.is_not_found() => {
                StoreError::NotFound(e.to_string())
            }
            PersistentStorageError::InvalidKey(key) => StoreError::InvalidArguments(key),
            PersistentStorageError::ForeignLocator(loc) => {
                StoreError::InvalidArguments(format!("foreign locator {}", loc))
            }
            PersistentStorageError::Serialization(e) => StoreError::Serialization(e),
            other => StoreError::Backend(other.to_string()),
        }
    }
}
