use std::fmt::{self, Display, Formatter};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use stockroom_core::attachment::{AttachmentOp, Upload};
use stockroom_core::event::{Event, EventAction};
use stockroom_core::record::{
    Attachment, AttachmentPatch, Record, RecordDraft, RecordFields, RecordId, RecordPatch,
    RecordView,
};
use stockroom_core::{EventSink, LocatorStore, RecordStore, StoreError};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, SyncError};

/// Unvalidated record fields as they arrive from the form.
#[derive(Debug, Clone, Default)]
pub struct RecordInput {
    pub price: Option<String>,
    pub quantity: Option<String>,
    pub item: Option<String>,
}

impl RecordInput {
    pub fn new(price: &str, quantity: &str, item: &str) -> Self {
        RecordInput {
            price: Some(price.to_string()),
            quantity: Some(quantity.to_string()),
            item: Some(item.to_string()),
        }
    }

    /// All three fields must be present and non-blank; price and quantity must parse.
    pub fn validate(&self) -> Result<RecordFields> {
        let price = non_blank(&self.price);
        let quantity = non_blank(&self.quantity);
        let item = non_blank(&self.item);

        let (Some(price), Some(quantity), Some(item)) = (price, quantity, item) else {
            let missing: Vec<&str> = [
                ("price", price.is_none()),
                ("quantity", quantity.is_none()),
                ("item", item.is_none()),
            ]
            .iter()
            .filter(|(_, absent)| *absent)
            .map(|(name, _)| *name)
            .collect();
            return Err(SyncError::Validation(format!(
                "missing required fields: {}",
                missing.join(", ")
            )));
        };

        let price = price
            .parse::<f64>()
            .ok()
            .filter(|p| p.is_finite())
            .ok_or_else(|| SyncError::Validation(format!("price must be a number, got '{}'", price)))?;
        let quantity = quantity.parse::<i64>().map_err(|_| {
            SyncError::Validation(format!("quantity must be an integer, got '{}'", quantity))
        })?;

        Ok(RecordFields {
            price,
            quantity,
            item: item.to_string(),
        })
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_id(id: &str) -> Result<RecordId> {
    RecordId::parse(id).ok_or_else(|| SyncError::Validation(format!("invalid record id '{}'", id)))
}

fn validate_file_name(name: &str) -> Result<()> {
    let invalid = name.trim().is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.chars().any(char::is_control);
    if invalid {
        return Err(SyncError::Validation(format!("invalid file name '{}'", name)));
    }
    Ok(())
}

/// Failure of a single collaborator call.
enum CallError {
    Timeout(&'static str),
    Store(StoreError),
}

impl CallError {
    /// Timeouts keep their own kind; store errors are wrapped by `wrap`.
    fn or(self, wrap: impl FnOnce(StoreError) -> SyncError) -> SyncError {
        match self {
            CallError::Timeout(what) => SyncError::Timeout(what.to_string()),
            CallError::Store(e) => wrap(e),
        }
    }

    fn internal(self) -> SyncError {
        self.or(|e| SyncError::Internal(e.to_string()))
    }
}

impl Display for CallError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Timeout(what) => write!(f, "timed out waiting for {}", what),
            CallError::Store(e) => write!(f, "{}", e),
        }
    }
}

/// Keeps the record store, the attachment store and the event sink consistent.
///
/// Blob work always happens before the record write it belongs to, so a
/// record never points at an attachment that was not stored. When a later
/// step fails the earlier blob work is undone where possible; a blob that
/// cannot be removed is logged and left behind.
///
/// Events are published only after the record write succeeded and never
/// fail the mutation.
#[derive(Clone)]
pub struct SyncCoordinator {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn LocatorStore>,
    events: Arc<dyn EventSink>,
    op_timeout: Duration,
}

impl SyncCoordinator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn LocatorStore>,
        events: Arc<dyn EventSink>,
        op_timeout: Duration,
    ) -> Self {
        SyncCoordinator {
            records,
            blobs,
            events,
            op_timeout,
        }
    }

    async fn call<T, F>(&self, what: &'static str, fut: F) -> std::result::Result<T, CallError>
    where
        F: Future<Output = stockroom_core::Result<T>>,
    {
        match timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(CallError::Store),
            Err(_) => Err(CallError::Timeout(what)),
        }
    }

    async fn find_existing(&self, id: &RecordId) -> Result<Record> {
        self.call("record lookup", self.records.find(id))
            .await
            .map_err(CallError::internal)?
            .ok_or_else(|| SyncError::NotFound(format!("record {}", id)))
    }

    pub async fn create(&self, input: RecordInput, file: Option<Upload>) -> Result<RecordView> {
        let fields = input.validate()?;
        if let Some(upload) = &file {
            validate_file_name(&upload.name)?;
        }

        let attachment = match file {
            Some(upload) => {
                let filename = upload.name;
                let locator = self
                    .call("attachment upload", self.blobs.put(&filename, upload.bytes))
                    .await
                    .map_err(|e| e.or(SyncError::AttachmentWrite))?;
                Some(Attachment { locator, filename })
            }
            None => None,
        };

        let draft = RecordDraft {
            fields,
            attachment: attachment.clone(),
        };
        let record = match self.call("record insert", self.records.insert(draft)).await {
            Ok(record) => record,
            Err(e) => {
                if let Some(attachment) = &attachment {
                    self.remove_orphan(&attachment.locator).await;
                }
                return Err(e.or(SyncError::RecordWrite));
            }
        };

        info!(record = %record.id, "created record");
        let view = record.view();
        self.notify(EventAction::Created, &view).await;
        Ok(view)
    }

    /// Replace the record's fields and apply `op` to its attachment.
    ///
    /// Any replacement also removes the blob it supersedes. A delete hint
    /// that names a file the record does not hold is rejected.
    pub async fn update(&self, id: &str, input: RecordInput, op: AttachmentOp) -> Result<RecordView> {
        let id = parse_id(id)?;
        let fields = input.validate()?;
        if let Some(upload) = op.upload() {
            validate_file_name(&upload.name)?;
        }

        let current = self.find_existing(&id).await?;
        let op = op
            .against(current.attachment.as_ref())
            .map_err(|e| SyncError::Validation(e.to_string()))?;

        // after `against`, a blob to delete is always the record's own attachment
        let detached = match (op.blob_to_delete(), &current.attachment) {
            (Some(_), Some(old)) => {
                self.call("attachment delete", self.blobs.delete(&old.locator))
                    .await
                    .map_err(|e| e.or(SyncError::AttachmentDelete))?;
                true
            }
            _ => false,
        };

        let attachment = match op {
            AttachmentOp::None => AttachmentPatch::Keep,
            AttachmentOp::DeleteOnly(_) => AttachmentPatch::Clear,
            AttachmentOp::Replace(upload) | AttachmentOp::ReplaceAndDeleteOld { upload, .. } => {
                let filename = upload.name;
                match self
                    .call("attachment upload", self.blobs.put(&filename, upload.bytes))
                    .await
                {
                    Ok(locator) => AttachmentPatch::Set(Attachment { locator, filename }),
                    Err(e) => {
                        if detached {
                            self.detach(&id).await;
                        }
                        return Err(e.or(SyncError::AttachmentWrite));
                    }
                }
            }
        };

        // a freshly uploaded blob is ours to remove if the record write fails
        let orphan = match &attachment {
            AttachmentPatch::Set(a) => Some(a.locator.clone()),
            _ => None,
        };

        let patch = RecordPatch::from_fields(fields).with_attachment(attachment);
        let updated = match self.call("record update", self.records.update(&id, patch)).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                if let Some(locator) = &orphan {
                    self.remove_orphan(locator).await;
                }
                return Err(SyncError::NotFound(format!("record {}", id)));
            }
            Err(e) => {
                if let Some(locator) = &orphan {
                    self.remove_orphan(locator).await;
                }
                if detached {
                    self.detach(&id).await;
                }
                return Err(e.or(SyncError::RecordWrite));
            }
        };

        info!(record = %updated.id, "updated record");
        let view = updated.view();
        self.notify(EventAction::Updated, &view).await;
        Ok(view)
    }

    /// Remove the record and its attachment; returns the record as it was.
    pub async fn delete(&self, id: &str) -> Result<RecordView> {
        let id = parse_id(id)?;
        let current = self.find_existing(&id).await?;

        if let Some(attachment) = &current.attachment {
            self.call("attachment delete", self.blobs.delete(&attachment.locator))
                .await
                .map_err(|e| e.or(SyncError::AttachmentDelete))?;
        }

        match self.call("record delete", self.records.delete(&id)).await {
            Ok(true) => {}
            Ok(false) => return Err(SyncError::NotFound(format!("record {}", id))),
            Err(e) => {
                if current.attachment.is_some() {
                    self.detach(&id).await;
                }
                return Err(e.or(SyncError::RecordWrite));
            }
        }

        info!(record = %id, "deleted record");
        let view = current.view();
        self.notify(EventAction::Deleted, &view).await;
        Ok(view)
    }

    pub async fn list_all(&self) -> Result<Vec<RecordView>> {
        let records = self
            .call("record listing", self.records.find_all())
            .await
            .map_err(CallError::internal)?;
        Ok(records.iter().map(Record::view).collect())
    }

    /// Fetch the bytes of the attachment named `filename` on record `id`.
    pub async fn download(&self, id: &str, filename: &str) -> Result<(String, Vec<u8>)> {
        let id = parse_id(id)?;
        let filename = filename.trim();
        if filename.is_empty() {
            return Err(SyncError::Validation(
                "missing required fields: filename".to_string(),
            ));
        }

        let record = self.find_existing(&id).await?;
        let attachment = record
            .attachment
            .filter(|a| a.filename == filename)
            .ok_or_else(|| {
                SyncError::NotFound(format!("attachment {} on record {}", filename, id))
            })?;

        let bytes = self
            .call("attachment download", self.blobs.get(&attachment.locator))
            .await
            .map_err(|e| {
                e.or(|e| match e {
                    StoreError::NotFound(what) => SyncError::NotFound(what),
                    other => SyncError::Internal(other.to_string()),
                })
            })?;
        debug!(record = %id, "served attachment {} ({} bytes)", filename, bytes.len());
        Ok((attachment.filename, bytes))
    }

    /// Receive and acknowledge up to `max` pending events, waiting at most `wait` for the first.
    pub async fn drain_events(&self, max: usize, wait: Duration) -> Result<Vec<Event>> {
        let deliveries = match timeout(wait + self.op_timeout, self.events.receive(max, wait)).await {
            Ok(Ok(deliveries)) => deliveries,
            Ok(Err(e)) => return Err(SyncError::Internal(e.to_string())),
            Err(_) => return Err(SyncError::Timeout("event receive".to_string())),
        };

        let mut events = Vec::with_capacity(deliveries.len());
        for delivery in deliveries {
            // an unacknowledged delivery is redelivered once its lock expires
            if let Err(e) = self
                .call("event acknowledge", self.events.acknowledge(delivery.tag))
                .await
            {
                warn!("failed to acknowledge delivery {}: {}", delivery.tag, e);
            }
            events.push(delivery.event);
        }
        Ok(events)
    }

    async fn notify(&self, action: EventAction, record: &RecordView) {
        let event = Event::new(action, record.clone());
        if let Err(e) = self.call("event publish", self.events.publish(&event)).await {
            warn!(record = %record.id, "dropping {} event: {}", action, e);
        }
    }

    async fn remove_orphan(&self, locator: &str) {
        match self.call("attachment cleanup", self.blobs.delete(locator)).await {
            Ok(()) => warn!("removed attachment {} after failed record write", locator),
            Err(e) => error!("attachment {} is orphaned, cleanup failed: {}", locator, e),
        }
    }

    /// Clear the attachment of a record whose blob was already deleted.
    async fn detach(&self, id: &RecordId) {
        let patch = RecordPatch {
            attachment: AttachmentPatch::Clear,
            ..RecordPatch::default()
        };
        match self.call("record detach", self.records.update(id, patch)).await {
            Ok(_) => warn!(record = %id, "cleared attachment after failed update"),
            Err(e) => error!(record = %id, "record references a deleted attachment: {}", e),
        }
    }
}
