mod errors;
pub use errors::PersistentStorageError;

mod cloud_store;
pub use cloud_store::{BackendConfig, CloudBackend, CloudStore, LocalBackend};

// Locator store over the cloud operator
mod blob_store;
pub use blob_store::BlobStore;

// Record store persisting JSON documents through the same operator
mod document_store;
pub use document_store::DocumentStore;
