//! Tests: DocumentStore as the record store
//!
//! Purpose
//! - Validate create/read/update/delete of JSON record documents through opendal,
//!   including `$set`-style merges and not-found reporting.

mod common;

use std::sync::{Arc, Mutex};

use common::{draft, fs_cloud, memory_cloud};
use stockroom_core::record::{Attachment, AttachmentPatch, RecordId, RecordPatch};
use stockroom_core::RecordStore;
use stockroom_persistent_storage::DocumentStore;
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Records the level and target of every event emitted while installed.
#[derive(Clone, Default)]
struct CapturedLevels(Arc<Mutex<Vec<(Level, String)>>>);

impl<S: Subscriber> Layer<S> for CapturedLevels {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        self.0
            .lock()
            .unwrap()
            .push((*meta.level(), meta.target().to_string()));
    }
}

#[tokio::test]
async fn insert_then_find_round_trips_all_fields() {
    let docs = DocumentStore::new(memory_cloud("db"));
    let mut d = draft("pen", 10.5, 2);
    d.attachment = Some(Attachment {
        locator: "memory://blobs/attachments/pen.png".to_string(),
        filename: "pen.png".to_string(),
    });

    let created = docs.insert(d).await.expect("insert");
    let found = docs.find(&created.id).await.unwrap().expect("present");

    assert_eq!(found, created);
}

#[tokio::test]
async fn find_all_lists_every_document() {
    let docs = DocumentStore::new(memory_cloud("db"));
    let a = docs.insert(draft("a", 1.0, 1)).await.unwrap();
    let b = docs.insert(draft("b", 2.0, 2)).await.unwrap();

    let mut ids: Vec<RecordId> = docs
        .find_all()
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    ids.sort_by(|x, y| x.as_str().cmp(y.as_str()));
    let mut expected = vec![a.id, b.id];
    expected.sort_by(|x, y| x.as_str().cmp(y.as_str()));
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn update_merges_and_reports_missing() {
    let docs = DocumentStore::new(memory_cloud("db"));
    let created = docs.insert(draft("pen", 10.0, 2)).await.unwrap();

    let patch = RecordPatch {
        item: Some("marker".to_string()),
        ..Default::default()
    }
    .with_attachment(AttachmentPatch::Set(Attachment {
        locator: "memory://blobs/attachments/m.png".to_string(),
        filename: "m.png".to_string(),
    }));
    let updated = docs.update(&created.id, patch).await.unwrap().unwrap();
    assert_eq!(updated.item, "marker");
    assert_eq!(updated.quantity, 2);
    assert_eq!(updated.view().file_name.as_deref(), Some("m.png"));

    let stored = docs.find(&created.id).await.unwrap().unwrap();
    assert_eq!(stored, updated);

    let missing = RecordId::parse("nope").unwrap();
    assert!(docs
        .update(&missing, RecordPatch::default())
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn delete_reports_whether_a_document_existed() {
    let docs = DocumentStore::new(memory_cloud("db"));
    let created = docs.insert(draft("pen", 10.0, 2)).await.unwrap();

    assert!(docs.delete(&created.id).await.unwrap());
    assert!(!docs.delete(&created.id).await.unwrap());
    assert!(docs.find(&created.id).await.unwrap().is_none());
    assert!(docs.find_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn fs_documents_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let created = {
        let docs = DocumentStore::new(fs_cloud(dir.path()));
        docs.insert(draft("durable", 3.0, 9)).await.unwrap()
    };

    let reopened = DocumentStore::new(fs_cloud(dir.path()));
    let all = reopened.find_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, created.id);
    assert_eq!(all[0].item, "durable");
}

#[tokio::test]
async fn corrupt_document_is_skipped_and_logged_as_error() {
    let captured = CapturedLevels::default();
    let _guard = tracing_subscriber::registry()
        .with(captured.clone())
        .set_default();

    let dir = tempfile::tempdir().expect("tempdir");
    let docs = DocumentStore::new(fs_cloud(dir.path()));
    let good = docs.insert(draft("pen", 1.0, 1)).await.unwrap();
    std::fs::write(dir.path().join("records").join("bad.json"), b"{ not json").unwrap();

    let all = docs.find_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, good.id);

    let events = captured.0.lock().unwrap();
    assert!(events
        .iter()
        .any(|(level, target)| *level == Level::ERROR && target == "document_store"));
}
