#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stockroom_core::record::{Record, RecordDraft, RecordId, RecordPatch};
use stockroom_core::{
    EventSink, LocatorStore, MemoryRecordStore, RecordStore, Result, StoreError,
};
use stockroom_persistent_storage::{BackendConfig, BlobStore, CloudStore, LocalBackend};
use stockroom_reliable_dispatch::{EventQueue, QueueOptions};
use stockroom_server::app::{build_router, AppState};
use stockroom_server::SyncCoordinator;

fn injected(what: &str) -> StoreError {
    StoreError::Backend(format!("injected {} failure", what))
}

/// Attachment store over OpenDAL memory that counts calls and fails on demand.
pub struct SpyBlobs {
    inner: BlobStore,
    pub puts: AtomicUsize,
    pub deletes: AtomicUsize,
    pub fail_put: AtomicBool,
    pub fail_delete: AtomicBool,
    pub stall: AtomicBool,
}

impl SpyBlobs {
    pub fn new() -> Self {
        let cloud = CloudStore::new(BackendConfig::Local {
            backend: LocalBackend::Memory,
            root: "attachments-test".to_string(),
        })
        .expect("memory cloud store");
        SpyBlobs {
            inner: BlobStore::new(cloud),
            puts: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            fail_put: AtomicBool::new(false),
            fail_delete: AtomicBool::new(false),
            stall: AtomicBool::new(false),
        }
    }

    /// Put and delete attempts, successful or not.
    pub fn mutations(&self) -> usize {
        self.puts.load(Ordering::SeqCst) + self.deletes.load(Ordering::SeqCst)
    }

    /// Filenames of every stored blob, one entry per object.
    pub async fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .keys()
            .await
            .expect("list attachments")
            .iter()
            .map(|key| BlobStore::filename_of(key).to_string())
            .collect();
        names.sort();
        names
    }

    pub async fn exists(&self, locator: &str) -> bool {
        self.inner.exists(locator).await.expect("stat attachment")
    }

    async fn maybe_stall(&self) {
        if self.stall.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(30)).await;
        }
    }
}

#[async_trait]
impl LocatorStore for SpyBlobs {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<String> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.maybe_stall().await;
        if self.fail_put.load(Ordering::SeqCst) {
            return Err(injected("put"));
        }
        self.inner.put(name, bytes).await
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>> {
        self.maybe_stall().await;
        self.inner.get(locator).await
    }

    async fn delete(&self, locator: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.maybe_stall().await;
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.inner.delete(locator).await
    }
}

/// In-memory record store with switchable write failures.
#[derive(Default)]
pub struct FlakyRecords {
    inner: MemoryRecordStore,
    pub fail_insert: AtomicBool,
    pub fail_update: AtomicBool,
    pub fail_delete: AtomicBool,
}

impl FlakyRecords {
    pub async fn get(&self, id: &RecordId) -> Option<Record> {
        self.inner.find(id).await.expect("memory find")
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[async_trait]
impl RecordStore for FlakyRecords {
    async fn insert(&self, draft: RecordDraft) -> Result<Record> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(injected("insert"));
        }
        self.inner.insert(draft).await
    }

    async fn find(&self, id: &RecordId) -> Result<Option<Record>> {
        self.inner.find(id).await
    }

    async fn find_all(&self) -> Result<Vec<Record>> {
        self.inner.find_all().await
    }

    async fn update(&self, id: &RecordId, patch: RecordPatch) -> Result<Option<Record>> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Err(injected("update"));
        }
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: &RecordId) -> Result<bool> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(injected("delete"));
        }
        self.inner.delete(id).await
    }
}

pub struct Harness {
    pub coordinator: SyncCoordinator,
    pub records: Arc<FlakyRecords>,
    pub blobs: Arc<SpyBlobs>,
    pub events: Arc<EventQueue>,
}

pub fn harness() -> Harness {
    harness_with_timeout(Duration::from_secs(2))
}

pub fn harness_with_timeout(op_timeout: Duration) -> Harness {
    let records = Arc::new(FlakyRecords::default());
    let blobs = Arc::new(SpyBlobs::new());
    let events = Arc::new(EventQueue::new("records-test", QueueOptions::default()));
    let coordinator = SyncCoordinator::new(
        Arc::clone(&records) as Arc<dyn RecordStore>,
        Arc::clone(&blobs) as Arc<dyn LocatorStore>,
        Arc::clone(&events) as Arc<dyn EventSink>,
        op_timeout,
    );
    Harness {
        coordinator,
        records,
        blobs,
        events,
    }
}

/// Serve the router on an ephemeral port and return its base URL.
pub async fn spawn_test_server(harness: &Harness) -> String {
    let state = Arc::new(AppState {
        coordinator: harness.coordinator.clone(),
        event_batch: 10,
        event_wait: Duration::from_millis(50),
    });
    let app = build_router(state, 1024 * 1024);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://127.0.0.1:{}", port)
}
