//! Google Pub/Sub adapter for the subscription boundary.
//!
//! Uses the unary REST surface (`subscriptions:pull` / `:acknowledge`)
//! rather than the streaming protocol: each of the session's parallel puller
//! tasks requests a small batch, hands every message to the delivery
//! handler, and loops until cancelled. Flow control is approximated: the
//! parallelism setting maps to puller tasks and the outstanding-message cap
//! bounds batch size; the byte cap and extension window are left to broker
//! defaults, which the unary surface cannot steer.
//!
//! Without the `gcp` feature a placeholder with the same surface is
//! compiled, whose constructor reports that the build lacks GCP support.

#[cfg(feature = "gcp")]
mod gcp_impl {
    use std::sync::Arc;

    use async_trait::async_trait;
    use base64::prelude::*;
    use bytes::Bytes;
    use gcp_auth::TokenProvider;
    use serde::{Deserialize, Serialize};
    use tokio_util::sync::CancellationToken;
    use tracing::{debug, warn};

    use crate::{
        broker::{DeliveryHandler, ReceiveSettings, Subscriber},
        error::CoreError,
        message::{AckHandle, ReceivedMessage},
    };

    const API_BASE: &str = "https://pubsub.googleapis.com/v1";
    const SCOPES: &[&str] = &["https://www.googleapis.com/auth/pubsub"];

    /// Subscription client pulling from one Pub/Sub subscription.
    pub struct PubSubSubscriber {
        http: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
        subscription_path: String,
    }

    impl PubSubSubscriber {
        /// Creates a subscriber for `subscription_id` in `project_id`,
        /// resolving credentials from the ambient environment.
        pub async fn new(
            project_id: impl Into<String>,
            subscription_id: impl Into<String>,
        ) -> Result<Self, CoreError> {
            let tokens = gcp_auth::provider().await.map_err(|e| {
                CoreError::configuration(format!("failed to resolve GCP credentials: {e}"))
            })?;
            let http = reqwest::Client::builder()
                .user_agent(concat!("sluice/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(|e| {
                    CoreError::configuration(format!("failed to build http client: {e}"))
                })?;
            Ok(Self {
                http,
                tokens,
                subscription_path: format!(
                    "projects/{}/subscriptions/{}",
                    project_id.into(),
                    subscription_id.into()
                ),
            })
        }
    }

    #[async_trait]
    impl Subscriber for PubSubSubscriber {
        async fn receive(
            &self,
            settings: ReceiveSettings,
            handler: Arc<dyn DeliveryHandler>,
            cancel: CancellationToken,
        ) -> Result<(), CoreError> {
            let batch = if settings.synchronous {
                1
            } else {
                settings.max_outstanding_messages.clamp(1, 100)
            };

            // Child token so a failing puller can stop its siblings without
            // being mistaken for a deliberate session cutoff.
            let stop = cancel.child_token();
            let mut workers = Vec::with_capacity(settings.parallelism.max(1));
            for _ in 0..settings.parallelism.max(1) {
                workers.push(tokio::spawn(run_puller(
                    self.http.clone(),
                    Arc::clone(&self.tokens),
                    self.subscription_path.clone(),
                    batch,
                    Arc::clone(&handler),
                    stop.clone(),
                )));
            }

            let mut failure: Option<CoreError> = None;
            for worker in workers {
                match worker.await {
                    Ok(Ok(())) => {}
                    Ok(Err(err)) => {
                        failure.get_or_insert(err);
                    }
                    Err(join_err) => {
                        stop.cancel();
                        failure.get_or_insert(CoreError::broker(format!(
                            "puller task failed: {join_err}"
                        )));
                    }
                }
            }
            drop(handler);

            if cancel.is_cancelled() {
                Err(CoreError::Cancelled)
            } else if let Some(err) = failure {
                Err(err)
            } else {
                Ok(())
            }
        }
    }

    async fn run_puller(
        http: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
        subscription_path: String,
        batch: usize,
        handler: Arc<dyn DeliveryHandler>,
        stop: CancellationToken,
    ) -> Result<(), CoreError> {
        loop {
            let envelopes = tokio::select! {
                () = stop.cancelled() => return Ok(()),
                result = pull_batch(&http, &tokens, &subscription_path, batch) => {
                    match result {
                        Ok(envelopes) => envelopes,
                        Err(err) => {
                            stop.cancel();
                            return Err(err);
                        }
                    }
                }
            };

            for envelope in envelopes {
                let payload = match BASE64_STANDARD.decode(envelope.message.data.as_bytes()) {
                    Ok(bytes) => Bytes::from(bytes),
                    Err(err) => {
                        // Never acked, so the broker redelivers it; decoding
                        // cannot get better on retry but dropping data
                        // silently would be worse.
                        warn!(
                            message_id = %envelope.message.message_id,
                            error = %err,
                            "skipping message with undecodable payload"
                        );
                        continue;
                    }
                };
                let acker = Box::new(PubSubAck {
                    http: http.clone(),
                    tokens: Arc::clone(&tokens),
                    subscription_path: subscription_path.clone(),
                    ack_id: envelope.ack_id,
                });
                handler
                    .deliver(ReceivedMessage::new(envelope.message.message_id, payload, acker))
                    .await;
            }
        }
    }

    async fn pull_batch(
        http: &reqwest::Client,
        tokens: &Arc<dyn TokenProvider>,
        subscription_path: &str,
        batch: usize,
    ) -> Result<Vec<ReceivedEnvelope>, CoreError> {
        let token = tokens
            .token(SCOPES)
            .await
            .map_err(|e| CoreError::broker(format!("token acquisition failed: {e}")))?;

        let url = format!("{API_BASE}/{subscription_path}:pull");
        let response = http
            .post(url)
            .bearer_auth(token.as_str())
            .json(&PullRequestBody { max_messages: batch })
            .send()
            .await
            .map_err(|e| CoreError::broker(format!("pull request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::broker(format!("pull rejected with HTTP {status}: {body}")));
        }

        let parsed: PullResponse = response
            .json()
            .await
            .map_err(|e| CoreError::broker(format!("pull response decode failed: {e}")))?;
        debug!(count = parsed.received_messages.len(), "pulled batch");
        Ok(parsed.received_messages)
    }

    struct PubSubAck {
        http: reqwest::Client,
        tokens: Arc<dyn TokenProvider>,
        subscription_path: String,
        ack_id: String,
    }

    #[async_trait]
    impl AckHandle for PubSubAck {
        async fn ack(self: Box<Self>) {
            let this = *self;
            let token = match this.tokens.token(SCOPES).await {
                Ok(token) => token,
                Err(err) => {
                    warn!(error = %err, "ack token acquisition failed, message will redeliver");
                    return;
                }
            };

            let url = format!("{API_BASE}/{}:acknowledge", this.subscription_path);
            let result = this
                .http
                .post(url)
                .bearer_auth(token.as_str())
                .json(&AckRequestBody { ack_ids: vec![this.ack_id] })
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    warn!(status = %response.status(), "ack rejected, message will redeliver");
                }
                Err(err) => {
                    warn!(error = %err, "ack request failed, message will redeliver");
                }
            }
        }
    }

    #[derive(Debug, Serialize)]
    struct PullRequestBody {
        #[serde(rename = "maxMessages")]
        max_messages: usize,
    }

    #[derive(Debug, Serialize)]
    struct AckRequestBody {
        #[serde(rename = "ackIds")]
        ack_ids: Vec<String>,
    }

    #[derive(Debug, Deserialize)]
    struct PullResponse {
        #[serde(rename = "receivedMessages", default)]
        received_messages: Vec<ReceivedEnvelope>,
    }

    #[derive(Debug, Deserialize)]
    struct ReceivedEnvelope {
        #[serde(rename = "ackId")]
        ack_id: String,
        message: PubSubMessage,
    }

    #[derive(Debug, Deserialize)]
    struct PubSubMessage {
        #[serde(default)]
        data: String,
        #[serde(rename = "messageId")]
        message_id: String,
    }
}

#[cfg(not(feature = "gcp"))]
mod placeholder_impl {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use crate::{
        broker::{DeliveryHandler, ReceiveSettings, Subscriber},
        error::CoreError,
    };

    /// Placeholder compiled when the `gcp` feature is disabled.
    pub struct PubSubSubscriber {
        _private: (),
    }

    impl PubSubSubscriber {
        /// Always fails: this build has no GCP support.
        pub async fn new(
            _project_id: impl Into<String>,
            _subscription_id: impl Into<String>,
        ) -> Result<Self, CoreError> {
            Err(CoreError::configuration(
                "Pub/Sub support is not compiled in; rebuild with the 'gcp' feature",
            ))
        }
    }

    #[async_trait]
    impl Subscriber for PubSubSubscriber {
        async fn receive(
            &self,
            _settings: ReceiveSettings,
            _handler: Arc<dyn DeliveryHandler>,
            _cancel: CancellationToken,
        ) -> Result<(), CoreError> {
            Err(CoreError::configuration(
                "Pub/Sub support is not compiled in; rebuild with the 'gcp' feature",
            ))
        }
    }
}

#[cfg(feature = "gcp")]
pub use gcp_impl::PubSubSubscriber;
#[cfg(not(feature = "gcp"))]
pub use placeholder_impl::PubSubSubscriber;

#[cfg(all(test, not(feature = "gcp")))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn placeholder_refuses_construction() {
        let err = PubSubSubscriber::new("proj", "sub").await.err().unwrap();
        assert!(err.to_string().contains("gcp"));
    }
}
