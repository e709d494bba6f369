use async_trait::async_trait;
use stockroom_core::record::{Record, RecordDraft, RecordId, RecordPatch};
use stockroom_core::{RecordStore, Result};
use tracing::error;

use crate::cloud_store::CloudStore;
use crate::errors::PersistentStorageError;

const RECORDS_DIR: &str = "records";

/// Record store keeping one JSON document per record at `records/<id>.json`.
///
/// Updates are read-merge-write without a version check: two concurrent
/// updates of the same id resolve as last-write-wins.
#[derive(Debug, Clone)]
pub struct DocumentStore {
    store: CloudStore,
}

impl DocumentStore {
    pub fn new(store: CloudStore) -> Self {
        DocumentStore { store }
    }

    fn path(id: &RecordId) -> String {
        format!("{}/{}.json", RECORDS_DIR, id)
    }

    async fn read(&self, path: &str) -> Result<Option<Record>> {
        match self.store.get_object(path).await {
            Ok(bytes) => {
                let record = serde_json::from_slice(&bytes).map_err(PersistentStorageError::from)?;
                Ok(Some(record))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, record: &Record) -> Result<()> {
        let bytes = serde_json::to_vec(record).map_err(PersistentStorageError::from)?;
        self.store.put_object(&Self::path(&record.id), bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl RecordStore for DocumentStore {
    async fn insert(&self, draft: RecordDraft) -> Result<Record> {
        let record = draft.into_record(RecordId::generate());
        self.write(&record).await?;
        Ok(record)
    }

    async fn find(&self, id: &RecordId) -> Result<Option<Record>> {
        self.read(&Self::path(id)).await
    }

    async fn find_all(&self) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        for path in self.store.list_objects(RECORDS_DIR).await? {
            if !path.ends_with(".json") {
                continue;
            }
            // a document removed between list and read is simply skipped
            match self.read(&path).await {
                Ok(Some(record)) => records.push(record),
                Ok(None) => {}
                Err(e) => {
                    error!(target: "document_store", "skipping unreadable document {}: {}", path, e);
                }
            }
        }
        Ok(records)
    }

    async fn update(&self, id: &RecordId, patch: RecordPatch) -> Result<Option<Record>> {
        let Some(mut record) = self.find(id).await? else {
            return Ok(None);
        };
        patch.apply(&mut record);
        self.write(&record).await?;
        Ok(Some(record))
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        let path = Self::path(id);
        if !self.store.object_exists(&path).await? {
            return Ok(false);
        }
        self.store.delete_object(&path).await?;
        Ok(true)
    }
}
