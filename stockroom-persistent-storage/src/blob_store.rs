use async_trait::async_trait;
use stockroom_core::{LocatorStore, Result};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cloud_store::{validate_key_segment, CloudStore};
use crate::errors::PersistentStorageError;

const ATTACHMENTS_DIR: &str = "attachments";

/// Attachment storage: one object per upload under `attachments/`.
///
/// Every put gets its own key `<token>-<name>`, so two uploads with the same
/// filename never share an object. Locators look like
/// `<backend root>/attachments/<token>-<name>`, e.g.
/// `azblob://records/attachments/3f2b..9c-invoice.pdf`.
#[derive(Debug, Clone)]
pub struct BlobStore {
    store: CloudStore,
}

impl BlobStore {
    pub fn new(store: CloudStore) -> Self {
        BlobStore { store }
    }

    fn path(key: &str) -> String {
        format!("{}/{}", ATTACHMENTS_DIR, key)
    }

    /// Object path of a locator handed out by this store.
    fn attachment_path(&self, locator: &str) -> Result<String> {
        let path = self.store.path_of(locator)?;
        match path.strip_prefix(&format!("{}/", ATTACHMENTS_DIR)) {
            Some(key) => {
                validate_key_segment(key)?;
                Ok(path)
            }
            None => Err(PersistentStorageError::ForeignLocator(locator.to_string()).into()),
        }
    }

    /// The filename a key was stored for.
    pub fn filename_of(key: &str) -> &str {
        key.split_once('-').map_or(key, |(_, name)| name)
    }

    pub async fn exists(&self, locator: &str) -> Result<bool> {
        let path = self.attachment_path(locator)?;
        Ok(self.store.object_exists(&path).await?)
    }

    /// Keys (`<token>-<name>`) of every stored attachment.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let prefix = format!("{}/", ATTACHMENTS_DIR);
        Ok(self
            .store
            .list_objects(ATTACHMENTS_DIR)
            .await?
            .into_iter()
            .map(|path| path.strip_prefix(&prefix).unwrap_or(&path).to_string())
            .collect())
    }
}

#[async_trait]
impl LocatorStore for BlobStore {
    async fn put(&self, name: &str, bytes: Vec<u8>) -> Result<String> {
        validate_key_segment(name)?;
        let key = format!("{}-{}", Uuid::new_v4().simple(), name);
        let path = Self::path(&key);
        let len = bytes.len();
        self.store.put_object(&path, bytes).await?;
        info!(target: "blob_store", "stored attachment {} as {} ({} bytes)", name, key, len);
        Ok(self.store.locator(&path))
    }

    async fn get(&self, locator: &str) -> Result<Vec<u8>> {
        let path = self.attachment_path(locator)?;
        debug!(target: "blob_store", "reading attachment {}", path);
        Ok(self.store.get_object(&path).await?)
    }

    async fn delete(&self, locator: &str) -> Result<()> {
        let path = self.attachment_path(locator)?;
        self.store.delete_object(&path).await?;
        info!(target: "blob_store", "deleted attachment {}", path);
        Ok(())
    }
}
