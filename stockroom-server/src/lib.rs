pub mod app;
pub mod args_parse;
pub mod coordinator;
pub mod errors;
pub mod http;
pub mod service_configuration;

pub use coordinator::{RecordInput, SyncCoordinator};
pub use errors::{Result, SyncError};
