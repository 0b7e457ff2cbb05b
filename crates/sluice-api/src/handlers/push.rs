//! Push-delivery handler.
//!
//! Accepts broker-initiated push deliveries, decodes the payload, and
//! persists exactly one object keyed by the broker message id. A 200 tells
//! the broker the delivery is settled; anything else makes it redeliver.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::prelude::*;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sluice_core::ObjectKey;
use sluice_ingest::IngestError;
use tracing::{error, info, instrument, warn};

use super::{error_response, reject};
use crate::AppState;

/// Standard push-delivery envelope posted by the broker.
///
/// The envelope is the broker's schema, not ours: unknown fields are
/// tolerated so broker-side additions never break ingestion.
#[derive(Debug, Deserialize)]
pub struct PushEnvelope {
    /// The delivered message.
    pub message: PushMessage,
    /// Full name of the subscription the delivery came from.
    #[serde(default)]
    pub subscription: Option<String>,
}

/// Message portion of the push envelope.
#[derive(Debug, Deserialize)]
pub struct PushMessage {
    /// Base64-encoded payload. Empty when the publisher sent no data.
    #[serde(default)]
    pub data: String,
    /// Broker-assigned message identifier.
    #[serde(rename = "messageId")]
    pub message_id: String,
}

/// Persists one push-delivered message to the object store.
///
/// The object key embeds the wall-clock hour of the persist call and the
/// broker message id, so redeliveries overwrite the same object instead of
/// accumulating duplicates within the hour.
///
/// # Errors
///
/// Returns appropriate HTTP status codes:
/// - 400: Envelope is not valid JSON or the payload is not valid base64
/// - 500: Object-store write failed (broker will redeliver)
#[instrument(name = "push", skip_all)]
pub async fn push(State(state): State<AppState>, body: Bytes) -> Response {
    let envelope: PushEnvelope = match serde_json::from_slice(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(error = %e, "Rejecting malformed push envelope");
            return reject(
                StatusCode::BAD_REQUEST,
                "bad_envelope",
                format!("Malformed push envelope: {e}"),
            );
        },
    };

    info!(
        message_id = %envelope.message.message_id,
        subscription = envelope.subscription.as_deref().unwrap_or("unknown"),
        "Processing push delivery"
    );

    let payload = match BASE64_STANDARD.decode(&envelope.message.data) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "Rejecting undecodable push payload");
            return reject(
                StatusCode::BAD_REQUEST,
                "bad_envelope",
                format!("Message data is not valid base64: {e}"),
            );
        },
    };

    let stamp = DateTime::<Utc>::from(state.clock.now_system());
    let key = ObjectKey::build(&state.config.to_key_spec(), &envelope.message.message_id, stamp);

    match state.store.put(&key, payload.into()).await {
        Ok(()) => {
            info!(key = %key, "Push delivery persisted");
            StatusCode::OK.into_response()
        },
        Err(e) => {
            let e = IngestError::from(e);
            error!(error = %e, "Failed to persist push delivery");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, &e)
        },
    }
}
