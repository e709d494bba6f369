use stockroom_core::record::{RecordDraft, RecordFields};
use stockroom_persistent_storage::{BackendConfig, CloudStore, LocalBackend};

pub fn memory_cloud(root: &str) -> CloudStore {
    CloudStore::new(BackendConfig::Local {
        backend: LocalBackend::Memory,
        root: root.to_string(),
    })
    .expect("memory cloud store")
}

pub fn fs_cloud(dir: &std::path::Path) -> CloudStore {
    CloudStore::new(BackendConfig::Local {
        backend: LocalBackend::Fs,
        root: format!("file://{}", dir.display()),
    })
    .expect("fs cloud store")
}

#[allow(dead_code)]
pub fn draft(item: &str, price: f64, quantity: i64) -> RecordDraft {
    RecordDraft {
        fields: RecordFields {
            price,
            quantity,
            item: item.to_string(),
        },
        attachment: None,
    }
}
