//! Worker drain-trigger handlers.
//!
//! `/pull` runs a bounded-count session, `/stream` a duration-bounded one.
//! Both accept the trigger body the fan-out orchestrator posts and translate
//! session outcomes into HTTP responses.

use std::time::Duration;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use sluice_ingest::{IngestError, PullCoordinator, PullSessionConfig};
use tracing::{error, info, instrument, warn};

use super::{error_response, FINISHED_BODY};
use crate::AppState;

/// Trigger body posted by the fan-out orchestrator.
///
/// The body is strict: unknown fields are rejected so a misspelled setting
/// fails loudly instead of silently running with defaults. The instance
/// fields are telemetry from the fan-out round and only inform logging.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "PascalCase")]
pub struct PullRequest {
    /// Message cap as a decimal string.
    pub number_of_messages: String,
    /// Session deadline in seconds.
    pub number_of_seconds: u64,
    /// Position of this worker in the fan-out round, if any.
    #[serde(default)]
    pub instance_index: Option<u32>,
    /// Size of the fan-out round, if any.
    #[serde(default)]
    pub total_instances: Option<u32>,
}

/// Runs a bounded-count drain session.
///
/// Drains the subscription until `NumberOfMessages` messages have been
/// persisted and acknowledged or `NumberOfSeconds` elapse, whichever comes
/// first. A cap of zero completes immediately without touching the broker.
///
/// # Errors
///
/// Returns appropriate HTTP status codes:
/// - 422: `NumberOfMessages` does not parse as a non-negative integer
/// - 500: Broker receive failure or object-store write failure
#[instrument(
    name = "pull",
    skip(state),
    fields(
        deadline_secs = request.number_of_seconds,
        instance = ?request.instance_index,
        total = ?request.total_instances,
    )
)]
pub async fn pull(State(state): State<AppState>, Json(request): Json<PullRequest>) -> Response {
    info!("Processing synchronous drain trigger");

    let max_messages = match parse_message_cap(&request.number_of_messages) {
        Ok(cap) => cap,
        Err(response) => return response,
    };

    let deadline = Duration::from_secs(request.number_of_seconds);
    let session = state.config.to_pull_session_config(max_messages, deadline);

    run_session(&state, session).await
}

/// Runs a duration-bounded drain session.
///
/// Identical trigger body to `/pull`; the message cap must still parse but
/// its value is ignored, the session runs until `NumberOfSeconds` elapse.
///
/// # Errors
///
/// Returns appropriate HTTP status codes:
/// - 422: `NumberOfMessages` does not parse as a non-negative integer
/// - 500: Broker receive failure or object-store write failure
#[instrument(
    name = "stream",
    skip(state),
    fields(
        deadline_secs = request.number_of_seconds,
        instance = ?request.instance_index,
        total = ?request.total_instances,
    )
)]
pub async fn stream(State(state): State<AppState>, Json(request): Json<PullRequest>) -> Response {
    info!("Processing streaming drain trigger");

    if let Err(response) = parse_message_cap(&request.number_of_messages) {
        return response;
    }

    let deadline = Duration::from_secs(request.number_of_seconds);
    let session = state.config.to_streaming_session_config(deadline);

    run_session(&state, session).await
}

/// Runs one configured session and maps its outcome to a response.
async fn run_session(state: &AppState, session: PullSessionConfig) -> Response {
    let coordinator = PullCoordinator::new(
        state.subscriber.clone(),
        state.store.clone(),
        state.config.to_key_spec(),
        state.clock.clone(),
    );

    match coordinator.run(session).await {
        Ok(report) => {
            info!(delivered = report.delivered, "Drain session complete");
            (StatusCode::OK, FINISHED_BODY).into_response()
        },
        Err(e) => {
            error!(error = %e, "Drain session failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e)
        },
    }
}

/// Parses the string-typed message cap from the trigger body.
fn parse_message_cap(raw: &str) -> Result<u64, Response> {
    match raw.parse::<u64>() {
        Ok(cap) => Ok(cap),
        Err(_) => {
            warn!(value = raw, "Rejecting unparseable message cap");
            Err(error_response(
                StatusCode::UNPROCESSABLE_ENTITY,
                &IngestError::configuration(format!(
                    "NumberOfMessages '{raw}' is not a non-negative integer"
                )),
            ))
        },
    }
}
