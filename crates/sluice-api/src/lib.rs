//! Sluice HTTP API.
//!
//! Exposes the trigger endpoints (`/invoke`, `/pull`, `/stream`, `/push`)
//! and the liveness probe over axum, wiring validated configuration and the
//! broker/store adapters into the ingestion engine.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod handlers;
pub mod server;

use std::{sync::Arc, time::Instant};

use sluice_core::{BlobStore, Clock, Subscriber};
use sluice_ingest::{FanoutInvoker, IngestError, InvokerClient};

pub use config::Config;
pub use server::{create_router, start_server};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Validated service configuration.
    pub config: Arc<Config>,
    /// Broker subscription drained by pull sessions.
    pub subscriber: Arc<dyn Subscriber>,
    /// Blob store messages are persisted into.
    pub store: Arc<dyn BlobStore>,
    /// Clock injected into sessions and probes.
    pub clock: Arc<dyn Clock>,
    /// Fan-out orchestrator for the invoke trigger.
    pub invoker: FanoutInvoker,
    /// Process start, reported by the liveness probe.
    pub started_at: Instant,
}

impl AppState {
    /// Builds shared state from a validated configuration and the adapter
    /// implementations.
    ///
    /// Fails only when the worker HTTP client cannot be constructed.
    pub fn new(
        config: Config,
        subscriber: Arc<dyn Subscriber>,
        store: Arc<dyn BlobStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, IngestError> {
        let client = InvokerClient::new(&config.to_client_config())?;
        Ok(Self {
            config: Arc::new(config),
            subscriber,
            store,
            clock,
            invoker: FanoutInvoker::new(client),
            started_at: Instant::now(),
        })
    }
}
