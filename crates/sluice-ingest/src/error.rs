//! Error types for fan-out invocation and pull sessions.

use sluice_core::CoreError;
use thiserror::Error;

/// Convenience result type for ingest operations.
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors from the ingestion engine.
///
/// The variants split along the propagation policy: `Configuration`,
/// `InvalidWorkerUrl`, `Broker`, and `Persist` abort the operation that hit
/// them, `Transport` is recovered locally as a per-instance failure report,
/// and `Cancelled` is the expected end of a deliberately stopped session.
#[derive(Debug, Error)]
pub enum IngestError {
    /// A required setting is missing or malformed.
    #[error("configuration error: {message}")]
    Configuration {
        /// What was missing or malformed
        message: String,
    },

    /// The worker URL does not match the required endpoint form.
    #[error("worker url '{url}' is not a valid cloud function endpoint")]
    InvalidWorkerUrl {
        /// The rejected URL
        url: String,
    },

    /// One fan-out instance failed to dispatch or complete its request.
    #[error("instance #{instance} transport failure: {message}")]
    Transport {
        /// Instance index the failure belongs to
        instance: u32,
        /// Underlying failure description
        message: String,
    },

    /// The broker receive call failed for a reason other than deliberate
    /// cancellation.
    #[error("broker receive failed: {message}")]
    Broker {
        /// Underlying failure description
        message: String,
    },

    /// A blob-store write failed; the session aborts.
    #[error("persist failed for '{key}': {message}")]
    Persist {
        /// Object key the write was addressed to
        key: String,
        /// Underlying failure description
        message: String,
    },

    /// The session was stopped by its deadline or count cutoff.
    #[error("session cancelled")]
    Cancelled,
}

impl IngestError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates a worker-URL rejection.
    pub fn invalid_worker_url(url: impl Into<String>) -> Self {
        Self::InvalidWorkerUrl { url: url.into() }
    }

    /// Creates a per-instance transport failure.
    pub fn transport(instance: u32, message: impl Into<String>) -> Self {
        Self::Transport { instance, message: message.into() }
    }

    /// Creates a broker failure.
    pub fn broker(message: impl Into<String>) -> Self {
        Self::Broker { message: message.into() }
    }

    /// Creates a persist failure for the given object key.
    pub fn persist(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Persist { key: key.into(), message: message.into() }
    }

    /// True for the expected outcome of a deliberate stop.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// True when the error aborts its whole operation rather than being
    /// absorbed as a per-instance report.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Configuration { .. }
            | Self::InvalidWorkerUrl { .. }
            | Self::Broker { .. }
            | Self::Persist { .. } => true,
            Self::Transport { .. } | Self::Cancelled => false,
        }
    }

    /// Stable machine-readable name for the variant, used in API error
    /// bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::InvalidWorkerUrl { .. } => "invalid_worker_url",
            Self::Transport { .. } => "transport",
            Self::Broker { .. } => "broker",
            Self::Persist { .. } => "persist",
            Self::Cancelled => "cancelled",
        }
    }
}

impl From<CoreError> for IngestError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Configuration { message } => Self::Configuration { message },
            CoreError::Store { key, message } => Self::Persist { key, message },
            CoreError::Broker { message } => Self::Broker { message },
            CoreError::Cancelled => Self::Cancelled,
        }
    }
}
