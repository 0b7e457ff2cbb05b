//! HTTP server configuration and request routing.
//!
//! Provides Axum server setup with middleware stack, graceful shutdown,
//! and the trigger endpoints workers and schedulers call. Requests flow
//! through middleware in order:
//! 1. Request ID generation
//! 2. Request/response logging
//! 3. Timeout enforcement (derived from the configured deadlines)
//! 4. Handler execution
//!
//! # Graceful Shutdown
//!
//! The server handles SIGTERM gracefully:
//! - Stops accepting new connections
//! - Waits for in-flight requests
//! - Returns appropriate exit code

use std::net::SocketAddr;

use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{handlers, AppState};

/// Creates the Axum router with all routes and middleware.
///
/// Sets up:
/// - Trigger endpoints (`/invoke`, `/pull`, `/stream`, `/push`)
/// - Liveness probe (`/healthz`)
/// - Request tracing and logging
/// - Timeout handling sized to the configured session deadlines
///
/// # Example
///
/// ```no_run
/// use sluice_api::{create_router, AppState};
///
/// fn build(state: AppState) {
///     let app = create_router(state);
///     // Serve the app...
/// }
/// ```
pub fn create_router(state: AppState) -> Router {
    let request_timeout = state.config.request_timeout();

    let probe_routes = Router::new().route("/healthz", get(handlers::healthz));

    let trigger_routes = Router::new()
        .route("/invoke", post(handlers::invoke))
        .route("/pull", post(handlers::pull))
        .route("/stream", post(handlers::stream))
        .route("/push", post(handlers::push));

    Router::new()
        .merge(probe_routes)
        .merge(trigger_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Middleware to inject request ID into all responses.
///
/// Adds X-Request-Id header for tracing requests across services.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req = req;
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }

    response
}

/// Starts the HTTP server with graceful shutdown support.
///
/// Binds to the specified address and serves requests until shutdown
/// signal received. Handles graceful shutdown with timeout.
///
/// # Errors
///
/// Returns `std::io::Error` if:
/// - Port is already in use
/// - Network interface unavailable
///
/// # Example
///
/// ```no_run
/// use std::net::SocketAddr;
///
/// use sluice_api::{start_server, AppState};
///
/// async fn serve(state: AppState, addr: SocketAddr) -> Result<(), std::io::Error> {
///     start_server(state, addr).await
/// }
/// ```
pub async fn start_server(state: AppState, addr: SocketAddr) -> Result<(), std::io::Error> {
    let app = create_router(state);

    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("HTTP server listening on {}", actual_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("HTTP server stopped gracefully");
    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
///
/// Enables graceful shutdown on:
/// - CTRL+C (SIGINT) - Development
/// - SIGTERM - Kubernetes/Docker
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    warn!("Waiting for in-flight sessions to complete");
}
