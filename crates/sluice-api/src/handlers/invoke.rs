//! Fan-out trigger handler.
//!
//! Kicks off one round of parallel worker invocations and reports once
//! every instance has answered.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{error, info, instrument};

use super::{error_response, FINISHED_BODY};
use crate::AppState;

/// Triggers a fan-out round against the configured worker pool.
///
/// Dispatches `NUM_OF_INSTANCES` parallel worker invocations, each carrying
/// a unique instance index, and waits for every instance to report back.
/// Individual instance failures are logged but never escalated: the round
/// counts as complete once all reports are in.
///
/// # Errors
///
/// Returns appropriate HTTP status codes:
/// - 500: Worker URL fails validation (configuration error)
#[instrument(name = "invoke", skip_all)]
pub async fn invoke(State(state): State<AppState>) -> Response {
    info!("Processing fan-out trigger");

    match state.invoker.invoke(&state.config.to_fanout_config()).await {
        Ok(report) => {
            info!(
                instances = report.instances,
                successes = report.successes,
                "Fan-out round complete"
            );
            (StatusCode::OK, FINISHED_BODY).into_response()
        },
        Err(e) => {
            error!(error = %e, "Fan-out rejected before dispatch");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e)
        },
    }
}
