pub mod attachment;
pub mod event;
pub mod record;

mod errors;
pub use errors::{Result, StoreError};

mod store;
pub use store::{EventSink, LocatorStore, RecordStore};

mod memory_store;
pub use memory_store::MemoryRecordStore;
