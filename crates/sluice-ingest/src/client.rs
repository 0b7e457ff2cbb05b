//! HTTP client for dispatching worker invocations.

use std::time::Duration;

use reqwest::{header, redirect, StatusCode};
use tracing::debug;

use crate::{
    error::{IngestError, Result},
    fanout::{InstanceOutcome, InvocationRequest},
};

/// Settings for the invoker's HTTP client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// End-to-end budget for one worker invocation. Worker sessions run for
    /// minutes, so this defaults to the platform's maximum function
    /// duration.
    pub request_timeout: Duration,
    /// Budget for establishing the connection.
    pub connect_timeout: Duration,
    /// User-Agent header for outgoing requests.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(540),
            connect_timeout: Duration::from_secs(10),
            user_agent: concat!("sluice/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

/// Thin reqwest wrapper the fan-out dispatches through.
#[derive(Debug, Clone)]
pub struct InvokerClient {
    http: reqwest::Client,
}

impl InvokerClient {
    /// Builds the client. Fails only on invalid client configuration.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| {
                IngestError::configuration(format!("failed to build http client: {e}"))
            })?;
        Ok(Self { http })
    }

    /// Posts one invocation request and classifies the outcome.
    ///
    /// Never returns an error: every failure mode collapses into an
    /// [`InstanceOutcome`] so the fan-out can report it without escalating.
    pub(crate) async fn invoke_worker(
        &self,
        url: &str,
        request: &InvocationRequest,
    ) -> InstanceOutcome {
        let body = match serde_json::to_vec(request) {
            Ok(body) => body,
            Err(err) => {
                return InstanceOutcome::TransportError {
                    message: format!("request serialization failed: {err}"),
                };
            }
        };

        let response = match self
            .http
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                return InstanceOutcome::TransportError { message: describe_reqwest_error(&err) };
            }
        };

        let status = response.status();
        debug!(status = %status, "worker responded");
        if status == StatusCode::OK {
            InstanceOutcome::Success
        } else {
            let body = response.text().await.unwrap_or_default();
            InstanceOutcome::HttpError { status: status.as_u16(), body }
        }
    }
}

fn describe_reqwest_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_owned()
    } else if err.is_connect() {
        format!("connection failed: {err}")
    } else {
        format!("request failed: {err}")
    }
}
