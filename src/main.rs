//! Sluice serverless ingestion service.
//!
//! Main entry point for the sluice server. Loads configuration, connects
//! the broker and object-store adapters, and serves the trigger endpoints
//! until shutdown.

use std::sync::Arc;

use anyhow::{Context, Result};
use sluice_api::{AppState, Config};
use sluice_core::{GcsBlobStore, PubSubSubscriber, RealClock};
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with structured logging
    init_tracing();

    info!("Starting sluice ingestion service");

    // Load and validate configuration from environment
    let config = Config::load()?;
    info!(
        project_id = %config.project_id,
        subscription = %config.sub_id,
        bucket = %config.bucket_id,
        worker_url = %config.func_url,
        instances = config.num_of_instances,
        "Configuration loaded"
    );

    let addr = config.parse_server_addr()?;

    let subscriber = PubSubSubscriber::new(&config.project_id, &config.sub_id)
        .await
        .context("Failed to create the broker subscription client")?;
    info!("Broker subscription client established");

    let store = GcsBlobStore::new(&config.bucket_id)
        .await
        .context("Failed to create the object-store client")?;
    info!("Object-store client established");

    let state = AppState::new(config, Arc::new(subscriber), Arc::new(store), Arc::new(RealClock))
        .context("Failed to build application state")?;

    sluice_api::start_server(state, addr).await.context("HTTP server failed")?;

    info!("Sluice shutdown complete");
    Ok(())
}

/// Initializes tracing with environment-based configuration.
fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info,sluice=debug,tower_http=debug"))
        .expect("Invalid RUST_LOG environment variable");

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry().with(filter).with(fmt_layer).init();
}
