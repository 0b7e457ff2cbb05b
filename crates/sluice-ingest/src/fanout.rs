//! Parallel worker invocation and fan-in.
//!
//! The fan-out launches one task per instance, each posting an
//! [`InvocationRequest`] to the worker endpoint, then joins every task
//! before reporting. Per-instance failures are logged and counted, never
//! escalated: the orchestrator schedules invocations, it does not guarantee
//! their success.

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::{
    client::InvokerClient,
    error::Result,
    validate::validate_worker_url,
};

/// Settings for one fan-out run.
#[derive(Debug, Clone)]
pub struct FanoutConfig {
    /// Number of parallel worker invocations.
    pub instance_count: u32,
    /// Worker endpoint every instance posts to.
    pub worker_url: String,
    /// Session deadline forwarded to each worker, in seconds.
    pub number_of_seconds: u64,
    /// Synchronous message cap forwarded to each worker, as a decimal
    /// string.
    pub number_of_messages: String,
}

/// Body posted to the worker endpoint for one instance.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct InvocationRequest {
    /// Message cap the worker session should enforce.
    pub number_of_messages: String,
    /// Deadline the worker session should enforce, in seconds.
    pub number_of_seconds: u64,
    /// This instance's index, unique in `[1, total_instances]`.
    pub instance_index: u32,
    /// Total number of instances in the fan-out.
    pub total_instances: u32,
}

/// Classification of one instance's result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceOutcome {
    /// Worker answered HTTP 200.
    Success,
    /// Worker answered a non-200 status; body captured for the report.
    HttpError {
        /// HTTP status code the worker returned
        status: u16,
        /// Response body text
        body: String,
    },
    /// The request never completed.
    TransportError {
        /// Failure description
        message: String,
    },
}

/// One instance's report line.
#[derive(Debug, Clone)]
struct InstanceReport {
    instance: u32,
    outcome: InstanceOutcome,
}

impl InstanceReport {
    fn describe(&self) -> String {
        match &self.outcome {
            InstanceOutcome::Success => {
                format!("instance #{} invoked successfully", self.instance)
            }
            InstanceOutcome::HttpError { status, body } => {
                format!("instance #{} returned HTTP {status}: {body}", self.instance)
            }
            InstanceOutcome::TransportError { message } => {
                format!("instance #{} failed: {message}", self.instance)
            }
        }
    }
}

/// Aggregated fan-out result, produced once every instance has reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanoutReport {
    /// Instances launched.
    pub instances: u32,
    /// Instances that answered HTTP 200.
    pub successes: u32,
}

/// Orchestrates N parallel invocations of the worker endpoint.
#[derive(Debug, Clone)]
pub struct FanoutInvoker {
    client: InvokerClient,
}

impl FanoutInvoker {
    /// Creates an invoker dispatching through `client`.
    pub fn new(client: InvokerClient) -> Self {
        Self { client }
    }

    /// Runs one fan-out: validates the endpoint, launches every instance,
    /// and waits for all of them to report.
    ///
    /// Only a malformed worker URL fails this call; instance failures are
    /// folded into the returned [`FanoutReport`].
    #[instrument(skip_all, fields(instances = config.instance_count))]
    pub async fn invoke(&self, config: &FanoutConfig) -> Result<FanoutReport> {
        validate_worker_url(&config.worker_url)?;
        Ok(self.dispatch(config).await)
    }

    async fn dispatch(&self, config: &FanoutConfig) -> FanoutReport {
        let mut handles = Vec::with_capacity(config.instance_count as usize);
        for instance in 1..=config.instance_count {
            let client = self.client.clone();
            let url = config.worker_url.clone();
            let request = InvocationRequest {
                number_of_messages: config.number_of_messages.clone(),
                number_of_seconds: config.number_of_seconds,
                instance_index: instance,
                total_instances: config.instance_count,
            };
            handles.push((
                instance,
                tokio::spawn(async move { client.invoke_worker(&url, &request).await }),
            ));
        }

        // Fan-in: every instance produces exactly one report, and completion
        // is not conditional on any of them succeeding.
        let mut successes = 0;
        for (instance, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(join_err) => InstanceOutcome::TransportError {
                    message: format!("invocation task failed: {join_err}"),
                },
            };
            let report = InstanceReport { instance, outcome };
            match report.outcome {
                InstanceOutcome::Success => {
                    successes += 1;
                    info!(instance = report.instance, "{}", report.describe());
                }
                _ => warn!(instance = report.instance, "{}", report.describe()),
            }
        }

        FanoutReport { instances: config.instance_count, successes }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use wiremock::{
        matchers::{body_string_contains, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;
    use crate::client::ClientConfig;

    fn invoker() -> FanoutInvoker {
        FanoutInvoker::new(InvokerClient::new(&ClientConfig::default()).unwrap())
    }

    fn config_for(url: &str, instances: u32) -> FanoutConfig {
        FanoutConfig {
            instance_count: instances,
            worker_url: url.to_owned(),
            number_of_seconds: 30,
            number_of_messages: "5".to_owned(),
        }
    }

    #[tokio::test]
    async fn dispatches_one_request_per_instance_with_unique_indexes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_string("Finished execution"))
            .expect(6)
            .mount(&server)
            .await;

        let report = invoker().dispatch(&config_for(&server.uri(), 6)).await;
        assert_eq!(report.instances, 6);
        assert_eq!(report.successes, 6);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 6);

        let mut indexes = BTreeSet::new();
        for request in &requests {
            let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
            assert_eq!(body["TotalInstances"], 6);
            assert_eq!(body["NumberOfSeconds"], 30);
            assert_eq!(body["NumberOfMessages"], "5");
            indexes.insert(body["InstanceIndex"].as_u64().unwrap());
        }
        assert_eq!(indexes, (1..=6).collect());
    }

    #[tokio::test]
    async fn completes_even_when_an_instance_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("\"InstanceIndex\":3,"))
            .respond_with(ResponseTemplate::new(500).set_body_string("worker exploded"))
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let report = invoker().dispatch(&config_for(&server.uri(), 4)).await;

        assert_eq!(report.instances, 4);
        assert_eq!(report.successes, 3);
        assert_eq!(server.received_requests().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn transport_failures_still_produce_reports() {
        // Nothing listens here; every instance gets a connection failure.
        let report = invoker().dispatch(&config_for("http://127.0.0.1:9", 3)).await;
        assert_eq!(report.instances, 3);
        assert_eq!(report.successes, 0);
    }

    #[tokio::test]
    async fn single_instance_fanout_works() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let report = invoker().dispatch(&config_for(&server.uri(), 1)).await;
        assert_eq!(report.successes, 1);

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["InstanceIndex"], 1);
        assert_eq!(body["TotalInstances"], 1);
    }

    #[tokio::test]
    async fn invalid_worker_url_fails_before_any_dispatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        // The mock server's URL does not match the endpoint form.
        let err = invoker().invoke(&config_for(&server.uri(), 2)).await.err().unwrap();
        assert!(matches!(err, crate::IngestError::InvalidWorkerUrl { .. }));
    }

    #[test]
    fn report_lines_carry_instance_and_cause() {
        let ok = InstanceReport { instance: 2, outcome: InstanceOutcome::Success };
        assert_eq!(ok.describe(), "instance #2 invoked successfully");

        let http = InstanceReport {
            instance: 5,
            outcome: InstanceOutcome::HttpError { status: 500, body: "boom".into() },
        };
        assert_eq!(http.describe(), "instance #5 returned HTTP 500: boom");

        let transport = InstanceReport {
            instance: 1,
            outcome: InstanceOutcome::TransportError { message: "timed out".into() },
        };
        assert_eq!(transport.describe(), "instance #1 failed: timed out");
    }
}
