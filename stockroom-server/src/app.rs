use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    routing::{delete, get, post},
    Router,
};
use stockroom_core::{EventSink, LocatorStore, MemoryRecordStore, RecordStore};
use stockroom_persistent_storage::{BlobStore, CloudStore, DocumentStore};
use stockroom_reliable_dispatch::{EventQueue, FanoutSink};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::coordinator::SyncCoordinator;
use crate::http::{
    create_record, delete_record, download_attachment, drain_events, list_records, root,
    update_record,
};
use crate::service_configuration::{RecordStoreConfig, ServiceConfiguration};

pub struct AppState {
    pub coordinator: SyncCoordinator,
    pub event_batch: usize,
    pub event_wait: Duration,
}

/// The backends the server runs on, opened once at startup.
pub struct Services {
    pub coordinator: SyncCoordinator,
    /// Kept apart so shutdown can close it after the HTTP server stopped
    pub events: Arc<dyn EventSink>,
}

pub fn build_services(config: &ServiceConfiguration) -> Result<Services> {
    let records: Arc<dyn RecordStore> = match &config.record_store {
        RecordStoreConfig::Memory => {
            info!("Initializing in-memory record store");
            Arc::new(MemoryRecordStore::new())
        }
        RecordStoreConfig::Document { store } => {
            let cloud = CloudStore::new(store.into()).context("Failed to open the record store")?;
            info!("Initializing document record store at {}", cloud.location());
            Arc::new(DocumentStore::new(cloud))
        }
    };

    let cloud = CloudStore::new((&config.blob_store).into())
        .context("Failed to open the attachment store")?;
    info!("Initializing attachment store at {}", cloud.location());
    let blobs: Arc<dyn LocatorStore> = Arc::new(BlobStore::new(cloud));

    let sinks = config
        .queues
        .iter()
        .map(|(name, options)| {
            info!("Initializing event queue {}", name);
            let queue: Arc<dyn EventSink> = Arc::new(EventQueue::new(name, options.clone()));
            (name.clone(), queue)
        })
        .collect();
    let events: Arc<dyn EventSink> =
        Arc::new(FanoutSink::new(sinks).context("Failed to set up the event queues")?);

    let coordinator = SyncCoordinator::new(
        records,
        blobs,
        Arc::clone(&events),
        config.operation_timeout,
    );

    Ok(Services {
        coordinator,
        events,
    })
}

pub fn build_router(app_state: Arc<AppState>, body_limit: usize) -> Router {
    let cors = CorsLayer::permissive();

    Router::new()
        .route("/", get(root))
        .route(
            "/records",
            get(list_records).post(create_record).put(update_record),
        )
        .route("/records/{id}", delete(delete_record))
        .route("/records/{id}/download", post(download_attachment))
        .route("/events", get(drain_events))
        .with_state(app_state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
