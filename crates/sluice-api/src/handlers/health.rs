//! Liveness probe handler.
//!
//! Returns a minimal response indicating the service process is alive.
//! No external dependency is touched: a broker or store outage must not
//! make the orchestrator restart the process.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::AppState;

/// Liveness probe response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` while the process serves requests
    pub status: &'static str,
    /// Service version from the build
    pub version: &'static str,
    /// Seconds since the process started
    pub uptime_seconds: u64,
}

/// Liveness probe endpoint.
///
/// Designed to be called frequently by orchestration systems, so it avoids
/// any expensive work.
#[instrument(name = "healthz", skip(state))]
pub async fn healthz(State(state): State<AppState>) -> Response {
    debug!("Performing liveness check");

    let response = HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.started_at.elapsed().as_secs(),
    };

    (StatusCode::OK, Json(response)).into_response()
}
