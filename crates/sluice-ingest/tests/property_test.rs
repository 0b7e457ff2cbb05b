//! Property-based tests for ingestion invariants.
//!
//! Generates whole grammatical classes of worker URLs to verify the
//! validator accepts exactly the expected endpoint shape, checks that
//! invocation bodies always serialize with the field casing workers parse,
//! and drives bounded sessions with arbitrary caps to verify the cutoff
//! accounting never overshoots.

use std::{sync::Arc, time::Duration};

use proptest::{prelude::*, test_runner::Config as ProptestConfig};
use sluice_core::{MemoryBlobStore, RealClock};
use sluice_ingest::{
    fanout::InvocationRequest, validate_worker_url, PullCoordinator, PullSessionConfig,
};
use sluice_testing::{key_spec, message_batch, ScriptedBroker};

/// Creates property test configuration based on environment.
///
/// Uses environment variables:
/// - `PROPTEST_CASES`: Number of test cases (default: 64)
fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES").ok().and_then(|s| s.parse().ok()).unwrap_or(64);

    ProptestConfig::with_cases(cases)
}

proptest! {
    #![proptest_config(proptest_config())]

    /// Any URL in the accepted grammar passes validation.
    #[test]
    fn grammatical_endpoints_are_accepted(
        region in "[a-z][a-z0-9]{0,10}",
        project in "[A-Za-z0-9_]{1,16}",
        function in "[A-Za-z0-9_-]{1,24}",
    ) {
        let url = format!("https://{region}-{project}.cloudfunctions.net/{function}");
        prop_assert!(validate_worker_url(&url).is_ok(), "should accept {}", url);
    }

    /// The scheme must be https, whatever the rest of the URL looks like.
    #[test]
    fn plain_http_is_always_rejected(
        region in "[a-z]{2,8}",
        project in "[a-z0-9]{1,12}",
        function in "[A-Za-z0-9_]{1,16}",
    ) {
        let url = format!("http://{region}-{project}.cloudfunctions.net/{function}");
        prop_assert!(validate_worker_url(&url).is_err(), "should reject {}", url);
    }

    /// A host without the region-project hyphen is rejected.
    #[test]
    fn unhyphenated_hosts_are_rejected(
        host in "[a-z0-9_]{1,20}",
        function in "[A-Za-z0-9_]{1,16}",
    ) {
        let url = format!("https://{host}.cloudfunctions.net/{function}");
        prop_assert!(validate_worker_url(&url).is_err(), "should reject {}", url);
    }

    /// Anything appended after the function segment breaks the match.
    #[test]
    fn trailing_segments_are_rejected(
        function in "[A-Za-z0-9_]{1,16}",
        trailer in "[/?#][A-Za-z0-9/_-]{0,12}",
    ) {
        let url = format!("https://us-central1-p.cloudfunctions.net/{function}{trailer}");
        prop_assert!(validate_worker_url(&url).is_err(), "should reject {}", url);
    }

    /// Hosts outside cloudfunctions.net never pass, even with the right shape.
    #[test]
    fn foreign_domains_are_rejected(
        domain in "[a-z]{3,10}\\.(com|net|io)",
        function in "[A-Za-z0-9_]{1,12}",
    ) {
        let url = format!("https://my-region-proj.{domain}/{function}");
        prop_assert!(validate_worker_url(&url).is_err(), "should reject {}", url);
    }

    /// Invocation bodies always serialize with the casing workers parse,
    /// and round-trip the cap string untouched.
    #[test]
    fn invocation_bodies_use_worker_field_casing(
        cap in 0u64..=1_000_000,
        seconds in 1u64..=86_400,
        total in 1u32..=64,
    ) {
        let total_instances = total;
        let request = InvocationRequest {
            number_of_messages: cap.to_string(),
            number_of_seconds: seconds,
            instance_index: total_instances,
            total_instances,
        };

        let body = serde_json::to_value(&request).expect("request serializes");
        let cap_string = cap.to_string();
        prop_assert_eq!(body["NumberOfMessages"].as_str(), Some(cap_string.as_str()));
        prop_assert_eq!(body["NumberOfSeconds"].as_u64(), Some(seconds));
        prop_assert_eq!(body["InstanceIndex"].as_u64(), Some(u64::from(total_instances)));
        prop_assert_eq!(body["TotalInstances"].as_u64(), Some(u64::from(total_instances)));
    }

    /// With at least `cap` messages available, a bounded session delivers
    /// exactly `cap`: persisted, acknowledged once, never overshot, under
    /// any delivery parallelism.
    #[test]
    fn bounded_sessions_deliver_exactly_the_cap(
        cap in 0u64..=8,
        surplus in 0usize..=6,
        parallelism in 1usize..=4,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime builds");

        let (delivered, stored, acked, exactly_once) = runtime.block_on(async move {
            let broker = Arc::new(ScriptedBroker::new());
            for (id, payload) in message_batch(cap as usize + surplus) {
                broker.push_message(id, payload);
            }
            let store = Arc::new(MemoryBlobStore::new());
            let coordinator = PullCoordinator::new(
                broker.clone(),
                store.clone(),
                key_spec(),
                Arc::new(RealClock),
            );

            let config = PullSessionConfig {
                delivery_parallelism: parallelism,
                ..PullSessionConfig::synchronous(cap, Duration::from_secs(30))
            };
            let report = coordinator.run(config).await.expect("session should complete");

            (
                report.delivered,
                store.len().await as u64,
                broker.total_acked() as u64,
                broker.acks_are_exactly_once(),
            )
        });

        prop_assert_eq!(delivered, cap);
        prop_assert_eq!(stored, cap);
        prop_assert_eq!(acked, cap);
        prop_assert!(exactly_once);
    }
}
