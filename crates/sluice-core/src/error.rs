//! Error types shared across the sluice crates.

use thiserror::Error;

/// Errors produced at the core boundaries.
///
/// `Cancelled` is not a failure in the usual sense: subscription adapters
/// return it when a receive call was stopped by its cancellation token, and
/// callers filter it out of error reporting.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A required setting is missing or malformed.
    #[error("configuration error: {message}")]
    Configuration {
        /// What was missing or malformed
        message: String,
    },

    /// A blob-store write failed.
    #[error("store write failed for '{key}': {message}")]
    Store {
        /// Object key the write was addressed to
        key: String,
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

    /// The receive call stopped because its cancellation token fired.
    #[error("receive cancelled")]
    Cancelled,
}

impl CoreError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// Creates a store error for the given object key.
    pub fn store(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store { key: key.into(), message: message.into() }
    }

    /// Creates a broker error.
    pub fn broker(message: impl Into<String>) -> Self {
        Self::Broker { message: message.into() }
    }

    /// Returns true when this is the expected outcome of a deliberate stop,
    /// not a failure.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
