use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::Duration;

// For converting CloudConfig -> BackendConfig
use stockroom_persistent_storage::{BackendConfig, CloudBackend, LocalBackend};
use stockroom_reliable_dispatch::QueueOptions;

const DEFAULT_QUEUE: &str = "records";
const DEFAULT_BODY_LIMIT_MB: usize = 25;

/// configuration settings loaded from the config file
#[derive(Debug, Serialize, Deserialize)]
pub struct LoadConfiguration {
    /// HTTP listener configuration
    pub server: ServerNode,
    /// Where the records are kept
    pub record_store: RecordStoreConfig,
    /// Where the attachments are kept
    pub blob_store: CloudConfig,
    /// Event queues; the first one is consumed by GET /events
    #[serde(default)]
    pub queues: Vec<QueueNode>,
    #[serde(default)]
    pub timeouts: TimeoutsNode,
    #[serde(default)]
    pub events: EventsNode,
}

impl LoadConfiguration {
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse the configuration file")
    }
}

/// configuration settings for the Stockroom server, validated and resolved
#[derive(Debug, Clone)]
pub struct ServiceConfiguration {
    /// Address the HTTP API binds to
    pub listen_addr: SocketAddr,
    /// Maximum accepted request body, in bytes
    pub body_limit: usize,
    pub record_store: RecordStoreConfig,
    pub blob_store: CloudConfig,
    /// Queue names with their delivery options, primary first
    pub queues: Vec<(String, QueueOptions)>,
    /// Upper bound for every single backend call
    pub operation_timeout: Duration,
    /// Largest batch returned by GET /events
    pub event_batch: usize,
    /// How long GET /events waits for the first event
    pub event_wait: Duration,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ServerNode {
    /// Hostname or IP address to listen on
    pub host: String,
    pub port: u16,
    pub body_limit_mb: Option<usize>,
}

/// Record store configuration (tagged by `backend`)
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "backend")]
pub enum RecordStoreConfig {
    /// Process-local map, lost on restart
    #[serde(rename = "memory")]
    Memory,
    /// One JSON document per record on any object store
    #[serde(rename = "document")]
    Document { store: CloudConfig },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct QueueNode {
    pub name: String,
    pub lock_duration_ms: Option<u64>,
    pub max_deliveries: Option<u32>,
    /// Ready messages kept before the oldest is dead-lettered
    pub capacity: Option<usize>,
    pub dead_letter_capacity: Option<usize>,
}

impl QueueNode {
    fn options(&self) -> QueueOptions {
        let defaults = QueueOptions::default();
        QueueOptions {
            lock_duration: self
                .lock_duration_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_duration),
            max_deliveries: self.max_deliveries.unwrap_or(defaults.max_deliveries),
            capacity: self.capacity.unwrap_or(defaults.capacity),
            dead_letter_capacity: self
                .dead_letter_capacity
                .unwrap_or(defaults.dead_letter_capacity),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TimeoutsNode {
    pub operation_ms: u64,
}

impl Default for TimeoutsNode {
    fn default() -> Self {
        TimeoutsNode { operation_ms: 5000 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EventsNode {
    pub max_batch: usize,
    pub wait_ms: u64,
}

impl Default for EventsNode {
    fn default() -> Self {
        EventsNode {
            max_batch: 10,
            wait_ms: 500,
        }
    }
}

/// Implementing the TryFrom trait to transform LoadConfiguration into ServiceConfiguration
impl TryFrom<LoadConfiguration> for ServiceConfiguration {
    type Error = anyhow::Error;

    fn try_from(config: LoadConfiguration) -> Result<Self> {
        let listen_addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
            .parse()
            .context("Failed to create listen_addr")?;

        if config.timeouts.operation_ms == 0 {
            bail!("timeouts.operation_ms must be greater than zero");
        }
        if config.events.max_batch == 0 {
            bail!("events.max_batch must be greater than zero");
        }

        let mut queues = Vec::with_capacity(config.queues.len().max(1));
        let mut seen = HashSet::new();
        for queue in &config.queues {
            let name = queue.name.trim();
            if name.is_empty() {
                bail!("queue names must not be empty");
            }
            if !seen.insert(name.to_string()) {
                bail!("queue '{}' is configured twice", name);
            }
            if queue.max_deliveries == Some(0) {
                bail!("queue '{}': max_deliveries must be at least 1", name);
            }
            if queue.capacity == Some(0) {
                bail!("queue '{}': capacity must be at least 1", name);
            }
            queues.push((name.to_string(), queue.options()));
        }
        if queues.is_empty() {
            queues.push((DEFAULT_QUEUE.to_string(), QueueOptions::default()));
        }

        let body_limit_mb = config.server.body_limit_mb.unwrap_or(DEFAULT_BODY_LIMIT_MB);
        let Some(body_limit) = body_limit_mb.checked_mul(1024 * 1024) else {
            bail!("server.body_limit_mb of {} is too large", body_limit_mb);
        };

        Ok(ServiceConfiguration {
            listen_addr,
            body_limit,
            record_store: config.record_store,
            blob_store: config.blob_store,
            queues,
            operation_timeout: Duration::from_millis(config.timeouts.operation_ms),
            event_batch: config.events.max_batch,
            event_wait: Duration::from_millis(config.events.wait_ms),
        })
    }
}

/// Object store configuration enum (tagged by `backend`)
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(tag = "backend")]
pub enum CloudConfig {
    #[serde(rename = "memory")]
    Memory { root: String },
    #[serde(rename = "fs")]
    Fs { root: String },
    #[serde(rename = "s3")]
    S3 {
        root: String,
        region: Option<String>,
        endpoint: Option<String>,
        access_key: Option<String>,
        secret_key: Option<String>,
        role_arn: Option<String>,
        session_token: Option<String>,
        anonymous: Option<bool>,
        /// When true, use virtual-hosted-style addressing (bucket.host). When false, use path-style.
        virtual_host_style: Option<bool>,
    },
    #[serde(rename = "gcs")]
    Gcs {
        root: String,
        endpoint: Option<String>,
        credentials_json: Option<String>,
        credentials_path: Option<String>,
    },
    #[serde(rename = "azblob")]
    Azblob {
        /// Root format: "container" or "container/prefix"
        root: String,
        /// Example: http://127.0.0.1:10000/devstoreaccount1 or https://<account>.blob.core.windows.net
        endpoint: Option<String>,
        account_name: Option<String>,
        account_key: Option<String>,
        sas_token: Option<String>,
    },
}

fn insert_opt(options: &mut HashMap<String, String>, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        options.insert(key.into(), v.clone());
    }
}

// Provide a conversion from server CloudConfig to storage BackendConfig
impl From<&CloudConfig> for BackendConfig {
    fn from(cfg: &CloudConfig) -> Self {
        match cfg {
            CloudConfig::Memory { root } => BackendConfig::Local {
                backend: LocalBackend::Memory,
                root: root.clone(),
            },
            CloudConfig::Fs { root } => BackendConfig::Local {
                backend: LocalBackend::Fs,
                root: root.clone(),
            },
            CloudConfig::S3 {
                root,
                region,
                endpoint,
                access_key,
                secret_key,
                role_arn,
                session_token,
                anonymous,
                virtual_host_style,
            } => {
                let mut options: HashMap<String, String> = HashMap::new();
                insert_opt(&mut options, "region", region);
                insert_opt(&mut options, "endpoint", endpoint);
                insert_opt(&mut options, "access_key", access_key);
                insert_opt(&mut options, "secret_key", secret_key);
                insert_opt(&mut options, "role_arn", role_arn);
                insert_opt(&mut options, "session_token", session_token);
                if let Some(v) = anonymous {
                    options.insert("anonymous".into(), v.to_string());
                }
                if let Some(v) = virtual_host_style {
                    options.insert("virtual_host_style".into(), v.to_string());
                }
                BackendConfig::Cloud {
                    backend: CloudBackend::S3,
                    root: root.clone(),
                    options,
                }
            }
            CloudConfig::Gcs {
                root,
                endpoint,
                credentials_json,
                credentials_path,
            } => {
                let mut options: HashMap<String, String> = HashMap::new();
                insert_opt(&mut options, "endpoint", endpoint);
                insert_opt(&mut options, "credentials_json", credentials_json);
                insert_opt(&mut options, "credentials_path", credentials_path);
                BackendConfig::Cloud {
                    backend: CloudBackend::Gcs,
                    root: root.clone(),
                    options,
                }
            }
            CloudConfig::Azblob {
                root,
                endpoint,
                account_name,
                account_key,
                sas_token,
            } => {
                let mut options: HashMap<String, String> = HashMap::new();
                insert_opt(&mut options, "endpoint", endpoint);
                insert_opt(&mut options, "account_name", account_name);
                insert_opt(&mut options, "account_key", account_key);
                insert_opt(&mut options, "sas_token", sas_token);
                BackendConfig::Cloud {
                    backend: CloudBackend::Azblob,
                    root: root.clone(),
                    options,
                }
            }
        }
    }
}
