//! Worker endpoint URL validation.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{IngestError, Result};

static WORKER_URL: OnceLock<Regex> = OnceLock::new();

/// Accepted worker endpoints:
/// `https://<region>-<project>.cloudfunctions.net/<function>`, where each
/// segment is alphanumeric plus `-` and `_`.
fn worker_url_pattern() -> &'static Regex {
    WORKER_URL.get_or_init(|| {
        Regex::new(r"^https://[A-Za-z0-9_-]+-[A-Za-z0-9_-]+\.cloudfunctions\.net/[A-Za-z0-9_-]+$")
            .expect("worker url pattern compiles")
    })
}

/// Checks that `url` is a well-formed worker endpoint.
///
/// Rejection is a fatal configuration error: the fan-out refuses to
/// dispatch anything to an address outside the expected form.
pub fn validate_worker_url(url: &str) -> Result<()> {
    if worker_url_pattern().is_match(url) {
        Ok(())
    } else {
        Err(IngestError::invalid_worker_url(url))
    }
}
