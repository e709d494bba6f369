use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use super::{
    errors::Result,
    record::{Record, RecordDraft, RecordId, RecordPatch},
    store::RecordStore,
};

/// MemoryRecordStore keeps records in a concurrent map for the process lifetime.
/// Listing order follows the map's internal layout, not insertion.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    inner: Arc<DashMap<RecordId, Record>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        MemoryRecordStore {
            inner: Arc::new(DashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, draft: RecordDraft) -> Result<Record> {
        let mut id = RecordId::generate();
        while self.inner.contains_key(&id) {
            id = RecordId::generate();
        }
        let record = draft.into_record(id.clone());
        self.inner.insert(id, record.clone());
        Ok(record)
    }

    async fn find(&self, id: &RecordId) -> Result<Option<Record>> {
        Ok(self.inner.get(id).map(|entry| entry.value().clone()))
    }

    async fn find_all(&self) -> Result<Vec<Record>> {
        Ok(self
            .inner
            .iter()
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn update(&self, id: &RecordId, patch: RecordPatch) -> Result<Option<Record>> {
        // get_mut holds the shard lock, so the merge is atomic per record
        match self.inner.get_mut(id) {
            Some(mut entry) => {
                patch.apply(entry.value_mut());
                Ok(Some(entry.value().clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        Ok(self.inner.remove(id).is_some())
    }
}
