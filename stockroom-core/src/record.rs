use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use uuid::Uuid;

/// Opaque record identifier, assigned by the record store on insert.
///
/// Only ASCII alphanumerics, `-` and `_` are accepted so an id can be used
/// verbatim as a document key by path-addressed backends.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn generate() -> Self {
        RecordId(Uuid::new_v4().to_string())
    }

    pub fn parse(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed.len() > 128 {
            return None;
        }
        if !trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return None;
        }
        Some(RecordId(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A stored attachment. Both halves are always present together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    // retrievable reference returned by the locator store
    pub locator: String,
    // key the blob was stored under, used for later delete/replace
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub price: f64,
    pub quantity: i64,
    pub item: String,
    pub attachment: Option<Attachment>,
    pub last_modified: DateTime<Utc>,
}

impl Record {
    /// The caller-facing projection: the locator never leaves the service.
    pub fn view(&self) -> RecordView {
        RecordView {
            id: self.id.clone(),
            price: self.price,
            quantity: self.quantity,
            item: self.item.clone(),
            file_name: self.attachment.as_ref().map(|a| a.filename.clone()),
            last_modified: self.last_modified,
        }
    }
}

/// Wire shape of a record returned by the API and carried in events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView {
    pub id: RecordId,
    pub price: f64,
    pub quantity: i64,
    pub item: String,
    pub file_name: Option<String>,
    pub last_modified: DateTime<Utc>,
}

/// Validated domain fields of a record.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordFields {
    pub price: f64,
    pub quantity: i64,
    pub item: String,
}

/// Everything needed to insert a new record; the store assigns id and timestamp.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub fields: RecordFields,
    pub attachment: Option<Attachment>,
}

impl RecordDraft {
    pub fn into_record(self, id: RecordId) -> Record {
        Record {
            id,
            price: self.fields.price,
            quantity: self.fields.quantity,
            item: self.fields.item,
            attachment: self.attachment,
            last_modified: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum AttachmentPatch {
    #[default]
    Keep,
    Clear,
    Set(Attachment),
}

/// `$set`-style partial update: only populated fields are written.
#[derive(Debug, Clone, Default)]
pub struct RecordPatch {
    pub price: Option<f64>,
    pub quantity: Option<i64>,
    pub item: Option<String>,
    pub attachment: AttachmentPatch,
}

impl RecordPatch {
    pub fn from_fields(fields: RecordFields) -> Self {
        RecordPatch {
            price: Some(fields.price),
            quantity: Some(fields.quantity),
            item: Some(fields.item),
            attachment: AttachmentPatch::Keep,
        }
    }

    pub fn with_attachment(mut self, attachment: AttachmentPatch) -> Self {
        self.attachment = attachment;
        self
    }

    /// Merge the patch into `record` and bump its modification time.
    pub fn apply(self, record: &mut Record) {
        if let Some(price) = self.price {
            record.price = price;
        }
        if let Some(quantity) = self.quantity {
            record.quantity = quantity;
        }
        if let Some(item) = self.item {
            record.item = item;
        }
        match self.attachment {
            AttachmentPatch::Keep => {}
            AttachmentPatch::Clear => record.attachment = None,
            AttachmentPatch::Set(attachment) => record.attachment = Some(attachment),
        }
        record.last_modified = Utc::now();
    }
}
