//! HTTP request handlers for the sluice API.
//!
//! This module contains all HTTP endpoint handlers following a consistent
//! pattern:
//! - Input validation with appropriate error codes
//! - Tracing for observability
//! - Standardized error responses
//!
//! # Handler Organization
//!
//! Handlers are grouped by functionality:
//! - `invoke` - Fan-out trigger for the worker pool
//! - `pull` - Worker drain triggers (synchronous and streaming)
//! - `push` - Broker-initiated push deliveries
//! - `health` - Liveness probe
//!
//! # Error Handling
//!
//! All handlers return standardized error responses with:
//! - Appropriate HTTP status codes
//! - A stable machine-readable failure kind
//! - Human-readable error messages
//! - Request tracing IDs for debugging

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sluice_ingest::IngestError;

pub mod health;
pub mod invoke;
pub mod pull;
pub mod push;

// Re-export handlers for convenient access
pub use health::healthz;
pub use invoke::invoke;
pub use pull::{pull, stream};
pub use push::push;

/// Body returned by every trigger endpoint that ran to completion.
pub(crate) const FINISHED_BODY: &str = "Finished execution";

/// Error response with kind and message.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error details including kind and message
    pub error: ErrorDetail,
}

/// Detailed error information.
#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Stable machine-readable name of the failure class
    pub kind: String,
    /// Human-readable error description
    pub message: String,
}

/// Creates a standardized error response from an ingestion error.
pub(crate) fn error_response(status: StatusCode, error: &IngestError) -> Response {
    reject(status, error.kind(), error.to_string())
}

/// Creates a standardized error response from raw parts.
pub(crate) fn reject(status: StatusCode, kind: &str, message: impl Into<String>) -> Response {
    let error_response =
        ErrorResponse { error: ErrorDetail { kind: kind.to_string(), message: message.into() } };

    (status, Json(error_response)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_response_carries_status_and_kind() {
        let error = IngestError::configuration("NUM_OF_INSTANCES must be set");
        let response = error_response(StatusCode::INTERNAL_SERVER_ERROR, &error);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn reject_builds_a_response_from_parts() {
        let response = reject(StatusCode::BAD_REQUEST, "bad_envelope", "missing message");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
