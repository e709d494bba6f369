use async_trait::async_trait;
use std::time::Duration;

use super::errors::Result;
use super::event::{Delivery, DeliveryTag, Event};
use super::record::{Record, RecordDraft, RecordId, RecordPatch};

/// Keyed document backend holding the records.
#[async_trait]
pub trait RecordStore: Send + Sync + 'static {
    /// Insert a new record, assigning its id and modification time.
    async fn insert(&self, draft: RecordDraft) -> Result<Record>;
    async fn find(&self, id: &RecordId) -> Result<Option<Record>>;
    /// All records in the backend's native order.
    async fn find_all(&self) -> Result<Vec<Record>>;
    /// Merge `patch` into an existing record. `Ok(None)` if no record has `id`.
    async fn update(&self, id: &RecordId, patch: RecordPatch) -> Result<Option<Record>>;
    /// `Ok(false)` if no record has `id`.
    async fn delete(&self, id: &RecordId) -> Result<bool>;
}

/// Blob backend for attachments.
#[async_trait]
pub trait LocatorStore: Send + Sync + 'static {
    /// Store `bytes` for a file called `name`, returning a locator unique to this put.
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<String>;
    async fn get(&self, locator: &str) -> Result<Vec<u8>>;
    /// Remove the blob behind `locator`. Removing a missing blob succeeds.
    async fn delete(&self, locator: &str) -> Result<()>;
}

/// At-least-once notification backend.
///
/// Every delivery returned by `receive` stays locked until it is acknowledged,
/// abandoned or its lock expires; unacknowledged deliveries come back.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn publish(&self, event: &Event) -> Result<()>;
    /// Up to `max` pending deliveries, waiting at most `wait` for the first one.
    async fn receive(&self, max: usize, wait: Duration) -> Result<Vec<Delivery>>;
    async fn acknowledge(&self, tag: DeliveryTag) -> Result<()>;
    /// Release a locked delivery so it can be received again right away.
    async fn abandon(&self, tag: DeliveryTag) -> Result<()>;
    /// Stop accepting publishes and receives. Idempotent.
    async fn close(&self) -> Result<()>;
}
