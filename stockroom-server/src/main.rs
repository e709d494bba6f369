#![deny(unused_imports)]

use std::{fs::read_to_string, path::Path, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use stockroom_server::{
    app::{build_router, build_services, AppState},
    args_parse::Args,
    service_configuration::{LoadConfiguration, ServiceConfiguration},
};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging, RUST_LOG takes precedence over the default level
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // Load the configuration from the specified YAML file
    let config_content = read_to_string(Path::new(&args.config_file))
        .with_context(|| format!("Failed to read config file {}", args.config_file))?;
    let load_config = LoadConfiguration::from_yaml(&config_content)?;

    // Attempt to transform LoadConfiguration into ServiceConfiguration
    let mut service_config: ServiceConfiguration = load_config.try_into()?;
    args.apply(&mut service_config)?;

    let services = build_services(&service_config)?;
    let events = Arc::clone(&services.events);

    let app_state = Arc::new(AppState {
        coordinator: services.coordinator,
        event_batch: service_config.event_batch,
        event_wait: service_config.event_wait,
    });
    let app = build_router(app_state, service_config.body_limit);

    let listener = TcpListener::bind(service_config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", service_config.listen_addr))?;
    info!("Stockroom server listening on http://{}", service_config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("HTTP server stopped, closing event queues");
    events.close().await.context("Failed to close the event queues")?;
    info!("Stockroom server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
