use opendal::services::{Azblob, Fs, Gcs, Memory, S3};
use opendal::{EntryMode, ErrorKind, Operator};
use std::collections::HashMap;
use tracing::warn;

use crate::errors::{PersistentStorageError, Result};

#[derive(Debug, Clone)]
pub enum CloudBackend {
    S3,
    Gcs,
    Azblob,
}

#[derive(Debug, Clone)]
pub enum LocalBackend {
    Fs,
    Memory,
}

#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Object stores hosted out of process (S3, GCS, Azure Blob)
    Cloud {
        backend: CloudBackend,
        /// A URI-like root, e.g. s3://bucket/prefix, gcs://bucket/prefix, azblob://container/prefix
        root: String,
        /// Optional backend-specific options (endpoint, region, credentials, etc.)
        options: HashMap<String, String>,
    },
    /// Local backends colocated with the server (fs, memory)
    Local {
        backend: LocalBackend,
        /// For fs: an absolute directory like file:///var/lib/stockroom or /var/lib/stockroom
        /// For memory: a logical namespace (prefix is used as a virtual root)
        root: String,
    },
}

/// Thin wrapper over an OpenDAL operator that knows how to turn keys into locators.
#[derive(Debug, Clone)]
pub struct CloudStore {
    /// Optional extra prefix for key joining (used by Local backends)
    root_prefix: String,
    /// Public base of every locator handed out by this store
    location: String,
    op: Operator,
}

fn warn_unknown_options(service: &str, options: &HashMap<String, String>, allowed: &[&str]) {
    for k in options.keys() {
        if !allowed.contains(&k.as_str()) {
            warn!(
                target: "cloud_store",
                "unknown {} option '{}'; accepted keys: {:?}",
                service,
                k,
                allowed
            );
        }
    }
}

fn finish<B: opendal::Builder>(service: &str, builder: B) -> Result<Operator> {
    Operator::new(builder)
        .map(|b| b.finish())
        .map_err(|e| PersistentStorageError::Config(format!("opendal {} builder: {}", service, e)))
}

impl CloudStore {
    pub fn new(cfg: BackendConfig) -> Result<Self> {
        let (op, root_prefix, location) = match cfg {
            BackendConfig::Cloud {
                backend,
                root,
                options,
            } => {
                let (bucket, prefix) =
                    split_bucket_prefix(&root).map_err(PersistentStorageError::Config)?;
                let location = root.trim_end_matches('/').to_string();
                let op = match backend {
                    CloudBackend::S3 => {
                        warn_unknown_options(
                            "s3",
                            &options,
                            &[
                                "endpoint",
                                "region",
                                "access_key",
                                "secret_key",
                                "session_token",
                                "role_arn",
                                "anonymous",
                                "virtual_host_style",
                            ],
                        );
                        let mut builder = S3::default().bucket(&bucket);
                        if !prefix.is_empty() {
                            // S3 root must be an absolute path
                            builder = builder.root(&format!("/{}", prefix));
                        }
                        if let Some(endpoint) = options.get("endpoint") {
                            builder = builder.endpoint(endpoint);
                        }
                        if let Some(region) = options.get("region") {
                            builder = builder.region(region);
                        }
                        if let Some(ak) = options.get("access_key") {
                            builder = builder.access_key_id(ak);
                        }
                        if let Some(sk) = options.get("secret_key") {
                            builder = builder.secret_access_key(sk);
                        }
                        if let Some(token) = options.get("session_token") {
                            builder = builder.session_token(token);
                        }
                        if let Some(role) = options.get("role_arn") {
                            builder = builder.role_arn(role);
                        }
                        if options.get("anonymous").map(|v| v == "true").unwrap_or(false) {
                            builder = builder.allow_anonymous();
                        }
                        if options
                            .get("virtual_host_style")
                            .map(|v| v == "true")
                            .unwrap_or(false)
                        {
                            builder = builder.enable_virtual_host_style();
                        }
                        finish("s3", builder)?
                    }
                    CloudBackend::Gcs => {
                        warn_unknown_options(
                            "gcs",
                            &options,
                            &["endpoint", "credentials_path", "credentials_json"],
                        );
                        let mut builder = Gcs::default().bucket(&bucket);
                        if !prefix.is_empty() {
                            builder = builder.root(&format!("/{}", prefix));
                        }
                        if let Some(path) = options.get("credentials_path") {
                            builder = builder.credential_path(path);
                        }
                        if let Some(json) = options.get("credentials_json") {
                            builder = builder.credential(json);
                        }
                        if let Some(endpoint) = options.get("endpoint") {
                            builder = builder.endpoint(endpoint);
                        }
                        finish("gcs", builder)?
                    }
                    CloudBackend::Azblob => {
                        warn_unknown_options(
                            "azblob",
                            &options,
                            &["endpoint", "account_name", "account_key", "sas_token"],
                        );
                        let mut builder = Azblob::default().container(&bucket);
                        if !prefix.is_empty() {
                            builder = builder.root(&format!("/{}", prefix));
                        }
                        if let Some(endpoint) = options.get("endpoint") {
                            builder = builder.endpoint(endpoint);
                        } else if let Some(account) = options.get("account_name") {
                            builder = builder
                                .endpoint(&format!("https://{}.blob.core.windows.net", account));
                        }
                        if let Some(account) = options.get("account_name") {
                            builder = builder.account_name(account);
                        }
                        if let Some(key) = options.get("account_key") {
                            builder = builder.account_key(key);
                        }
                        if let Some(sas) = options.get("sas_token") {
                            builder = builder.sas_token(sas);
                        }
                        finish("azblob", builder)?
                    }
                };
                (op, String::new(), location)
            }
            BackendConfig::Local { backend, root } => match backend {
                LocalBackend::Fs => {
                    // Accept either file:///abs/path or /abs/path
                    let fs_root = split_fs_root(&root);
                    let location = format!("file://{}", fs_root.trim_end_matches('/'));
                    let op = finish("fs", Fs::default().root(&fs_root))?;
                    (op, String::new(), location)
                }
                LocalBackend::Memory => {
                    // Memory service ignores root but we keep a logical prefix
                    let prefix = normalize_prefix(root.trim_start_matches("memory://"));
                    let location = format!("memory://{}", prefix);
                    let op = finish("memory", Memory::default())?;
                    (op, prefix, location)
                }
            },
        };
        Ok(Self {
            root_prefix,
            location,
            op,
        })
    }

    pub async fn put_object(&self, path: &str, bytes: Vec<u8>) -> Result<()> {
        let key = self.join(path);
        self.op
            .write(&key, bytes)
            .await
            .map_err(|e| PersistentStorageError::backend("write", &key, e))?;
        Ok(())
    }

    pub async fn get_object(&self, path: &str) -> Result<Vec<u8>> {
        let key = self.join(path);
        let data = self
            .op
            .read(&key)
            .await
            .map_err(|e| PersistentStorageError::backend("read", &key, e))?;
        Ok(data.to_vec())
    }

    /// Delete an object by key. No-op if object doesn't exist.
    pub async fn delete_object(&self, path: &str) -> Result<()> {
        let key = self.join(path);
        self.op
            .delete(&key)
            .await
            .map_err(|e| PersistentStorageError::backend("delete", &key, e))
    }

    pub async fn object_exists(&self, path: &str) -> Result<bool> {
        let key = self.join(path);
        self.op
            .exists(&key)
            .await
            .map_err(|e| PersistentStorageError::backend("stat", &key, e))
    }

    /// Paths of all files directly under `dir`, relative to the store root.
    pub async fn list_objects(&self, dir: &str) -> Result<Vec<String>> {
        let key = format!("{}/", self.join(dir));
        let entries = match self.op.list(&key).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistentStorageError::backend("list", &key, e)),
        };
        let strip = if self.root_prefix.is_empty() {
            String::new()
        } else {
            format!("{}/", self.root_prefix)
        };
        Ok(entries
            .into_iter()
            .filter(|entry| entry.metadata().mode() == EntryMode::FILE)
            .map(|entry| {
                let path = entry.path();
                path.strip_prefix(&strip).unwrap_or(path).to_string()
            })
            .collect())
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    /// The externally visible locator of `path`.
    pub fn locator(&self, path: &str) -> String {
        format!("{}/{}", self.location, path.trim_matches('/'))
    }

    /// Inverse of [`CloudStore::locator`].
    pub fn path_of(&self, locator: &str) -> Result<String> {
        locator
            .strip_prefix(&self.location)
            .and_then(|rest| rest.strip_prefix('/'))
            .filter(|rest| !rest.is_empty())
            .map(|rest| rest.to_string())
            .ok_or_else(|| PersistentStorageError::ForeignLocator(locator.to_string()))
    }

    #[inline]
    fn join(&self, path: &str) -> String {
        let p = path.trim_matches('/');
        if self.root_prefix.is_empty() {
            p.to_string()
        } else {
            format!("{}/{}", self.root_prefix.trim_matches('/'), p)
        }
    }
}

pub(crate) fn split_bucket_prefix(uri: &str) -> std::result::Result<(String, String), String> {
    // Accept formats: s3://bucket, s3://bucket/prefix, azblob://container/prefix
    let parts: Vec<&str> = uri.splitn(2, "://").collect();
    if parts.len() == 2 {
        let rest = parts[1];
        let mut it = rest.splitn(2, '/');
        let bucket = it.next().unwrap_or("").to_string();
        if bucket.is_empty() {
            return Err(format!("invalid uri, missing bucket: {}", uri));
        }
        let prefix = it.next().unwrap_or("").to_string();
        Ok((bucket, normalize_prefix(&prefix)))
    } else {
        // If no scheme, treat entire string as bucket and no prefix
        Ok((uri.to_string(), String::new()))
    }
}

pub(crate) fn split_fs_root(uri_or_path: &str) -> String {
    uri_or_path
        .strip_prefix("file://")
        .unwrap_or(uri_or_path)
        .to_string()
}

pub(crate) fn normalize_prefix(p: &str) -> String {
    p.trim_matches('/').to_string()
}

/// Reject keys that would escape their directory or address a directory.
pub(crate) fn validate_key_segment(name: &str) -> Result<()> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains('/')
        || name.contains('\\')
        || name.chars().any(|c| c.is_control());
    if invalid {
        return Err(PersistentStorageError::InvalidKey(name.to_string()));
    }
    Ok(())
}
