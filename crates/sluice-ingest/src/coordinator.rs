//! Pull session orchestration.
//!
//! A session funnels every broker delivery callback through a capacity-one
//! channel into a single consumer task. The consumer is the only writer of
//! session accounting: it persists the payload, acknowledges the message,
//! and bumps the delivered count under one lock acquisition, so the count
//! can never run past the cap no matter how many callbacks the broker runs
//! concurrently. A deadline watcher races the count cutoff; whichever fires
//! first flips the session's `cancelled` flag exactly once.
//!
//! Shutdown is a drain, not a drop: the channel sender lives only inside
//! the handler given to the broker, so once `receive` returns and the
//! broker has released every handler clone, the channel closes and the
//! consumer runs the queue dry. Deliveries that arrive past the cutoff are
//! discarded without acknowledgment and the broker redelivers them to a
//! later session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sluice_core::{
    BlobStore, Clock, DeliveryHandler, KeySpec, ObjectKey, ReceivedMessage, Subscriber,
};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    error::{IngestError, Result},
    session::{PullSessionConfig, SessionReport},
};

/// Runs bounded pull sessions against a broker subscription, persisting
/// each message before acknowledging it.
pub struct PullCoordinator {
    subscriber: Arc<dyn Subscriber>,
    store: Arc<dyn BlobStore>,
    keys: KeySpec,
    clock: Arc<dyn Clock>,
}

/// Accounting shared between the consumer and the deadline watcher.
#[derive(Default)]
struct SessionState {
    delivered: u64,
    cancelled: bool,
    failure: Option<IngestError>,
}

/// Broker-facing handler that forwards deliveries into the session queue.
///
/// This struct owns the only sender; when the broker drops its last handler
/// clone the queue closes and the consumer drains out.
struct QueueHandler {
    queue: mpsc::Sender<ReceivedMessage>,
    cancel: CancellationToken,
}

#[async_trait::async_trait]
impl DeliveryHandler for QueueHandler {
    async fn deliver(&self, message: ReceivedMessage) {
        if self.cancel.is_cancelled() {
            // Past cutoff. Dropping the message unacked hands it back to
            // the broker for redelivery.
            debug!(message_id = %message.id, "discarding delivery past cutoff");
            return;
        }
        if self.queue.send(message).await.is_err() {
            warn!("session queue closed while a broker callback was in flight");
        }
    }
}

impl PullCoordinator {
    /// Creates a coordinator for one subscription and one blob store.
    pub fn new(
        subscriber: Arc<dyn Subscriber>,
        store: Arc<dyn BlobStore>,
        keys: KeySpec,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { subscriber, store, keys, clock }
    }

    /// Runs one pull session to completion.
    ///
    /// The session ends at the deadline, or in bounded-count mode as soon
    /// as `max_messages` messages have been persisted and acknowledged,
    /// whichever comes first. A zero cap ends the session before the
    /// subscription is touched. The returned report counts only messages
    /// that were both persisted and acknowledged; that count never exceeds
    /// the cap.
    ///
    /// A blob-store write failure aborts the session: the failing message
    /// is left unacknowledged and the session returns the persist error. A
    /// broker receive failure other than our own cancellation is returned
    /// as a broker error.
    #[instrument(skip_all, fields(
        synchronous = config.synchronous,
        max_messages = config.max_messages,
        deadline_secs = config.deadline.as_secs(),
    ))]
    pub async fn run(&self, config: PullSessionConfig) -> Result<SessionReport> {
        if config.synchronous && config.max_messages == 0 {
            info!("message cap is zero, session ends before subscribing");
            return Ok(SessionReport { delivered: 0 });
        }

        let state = Arc::new(Mutex::new(SessionState::default()));
        let cancel = CancellationToken::new();

        // Capacity one: every callback rendezvouses with the consumer, so
        // broker parallelism never outruns the accounting.
        let (queue_tx, queue_rx) = mpsc::channel(1);

        let consumer = tokio::spawn(consume(
            queue_rx,
            Arc::clone(&self.store),
            self.keys.clone(),
            Arc::clone(&self.clock),
            Arc::clone(&state),
            cancel.clone(),
            config.synchronous,
            config.max_messages,
        ));

        let watcher = tokio::spawn(watch_deadline(
            Arc::clone(&self.clock),
            config.deadline,
            Arc::clone(&state),
            cancel.clone(),
        ));

        // The handler is moved into `receive`; the subscriber releases
        // every clone before returning, which closes the queue.
        let handler: Arc<dyn DeliveryHandler> =
            Arc::new(QueueHandler { queue: queue_tx, cancel: cancel.clone() });
        let receive_result =
            self.subscriber.receive(config.receive_settings(), handler, cancel.clone()).await;

        let consumer_result = consumer.await;
        cancel.cancel();
        let _ = watcher.await;

        let mut session = state.lock().await;
        let delivered = session.delivered;
        if let Some(failure) = session.failure.take() {
            return Err(failure);
        }
        drop(session);

        match receive_result {
            Ok(()) => {}
            Err(err) if err.is_cancellation() => {}
            Err(err) => return Err(err.into()),
        }
        if consumer_result.is_err() {
            return Err(IngestError::broker("session consumer task failed"));
        }

        info!(delivered, "pull session finished");
        Ok(SessionReport { delivered })
    }
}

/// Single consumer: persists, acknowledges, and counts each queued message
/// under one lock acquisition, then drains the queue dry after the cutoff.
#[allow(clippy::too_many_arguments)]
async fn consume(
    mut queue: mpsc::Receiver<ReceivedMessage>,
    store: Arc<dyn BlobStore>,
    keys: KeySpec,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<SessionState>>,
    cancel: CancellationToken,
    synchronous: bool,
    max_messages: u64,
) {
    while let Some(message) = queue.recv().await {
        let mut session = state.lock().await;
        if session.cancelled {
            debug!(message_id = %message.id, "discarding queued delivery past cutoff");
            continue;
        }

        let stamp = DateTime::<Utc>::from(clock.now_system());
        let key = ObjectKey::build(&keys, &message.id, stamp);
        match store.put(&key, message.payload.clone()).await {
            Ok(()) => {
                message.ack().await;
                session.delivered += 1;
                debug!(key = %key, delivered = session.delivered, "message persisted");
                if synchronous && session.delivered >= max_messages {
                    info!(delivered = session.delivered, "message cutoff reached");
                    session.cancelled = true;
                    cancel.cancel();
                }
            }
            Err(err) => {
                // The message stays unacknowledged; the broker will
                // redeliver it once the session is gone.
                error!(key = %key, error = %err, "persist failed, aborting session");
                session.failure = Some(IngestError::from(err));
                session.cancelled = true;
                cancel.cancel();
            }
        }
    }
}

/// Ends the session at its deadline unless the cutoff got there first.
async fn watch_deadline(
    clock: Arc<dyn Clock>,
    deadline: std::time::Duration,
    state: Arc<Mutex<SessionState>>,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = clock.sleep(deadline) => {
            let mut session = state.lock().await;
            if !session.cancelled {
                info!(delivered = session.delivered, "deadline reached, ending session");
                session.cancelled = true;
                cancel.cancel();
            }
        }
        _ = cancel.cancelled() => {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sluice_core::{MemoryBlobStore, RealClock};
    use sluice_testing::{key_spec, message_batch, FlakyBlobStore, ScriptedBroker};

    use super::*;

    fn scripted(count: usize) -> Arc<ScriptedBroker> {
        let broker = Arc::new(ScriptedBroker::new());
        for (id, payload) in message_batch(count) {
            broker.push_message(id, payload);
        }
        broker
    }

    fn coordinator(broker: Arc<ScriptedBroker>, store: Arc<dyn BlobStore>) -> PullCoordinator {
        PullCoordinator::new(broker, store, key_spec(), Arc::new(RealClock::new()))
    }

    #[tokio::test]
    async fn bounded_session_stops_at_message_cutoff() {
        let broker = scripted(10);
        let store = Arc::new(MemoryBlobStore::new());
        let coordinator = coordinator(Arc::clone(&broker), store.clone());

        let config = PullSessionConfig {
            delivery_parallelism: 1,
            ..PullSessionConfig::synchronous(3, Duration::from_secs(30))
        };
        let report = coordinator.run(config).await.unwrap();

        assert_eq!(report.delivered, 3);
        assert_eq!(store.len().await, 3);
        assert_eq!(broker.total_acked(), 3);
        assert!(broker.acks_are_exactly_once());
    }

    #[tokio::test]
    async fn zero_message_cap_never_touches_the_broker() {
        let broker = scripted(5);
        let store = Arc::new(MemoryBlobStore::new());
        let coordinator = coordinator(Arc::clone(&broker), store.clone());

        let report = coordinator
            .run(PullSessionConfig::synchronous(0, Duration::from_secs(30)))
            .await
            .unwrap();

        assert_eq!(report.delivered, 0);
        assert_eq!(broker.remaining(), 5);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn deadline_ends_session_when_messages_run_out() {
        let broker = scripted(2);
        let store = Arc::new(MemoryBlobStore::new());
        let coordinator = coordinator(Arc::clone(&broker), store.clone());

        let report = coordinator
            .run(PullSessionConfig::synchronous(10, Duration::from_millis(300)))
            .await
            .unwrap();

        assert_eq!(report.delivered, 2);
        assert_eq!(store.len().await, 2);
        assert!(broker.acks_are_exactly_once());
    }

    #[tokio::test]
    async fn parallel_callbacks_never_push_the_count_past_the_cap() {
        let broker = scripted(32);
        let store = Arc::new(MemoryBlobStore::new());
        let coordinator = coordinator(Arc::clone(&broker), store.clone());

        let config = PullSessionConfig {
            delivery_parallelism: 4,
            ..PullSessionConfig::synchronous(8, Duration::from_secs(30))
        };
        let report = coordinator.run(config).await.unwrap();

        assert_eq!(report.delivered, 8);
        assert_eq!(store.len().await, 8);
        assert_eq!(broker.total_acked(), 8);
        assert!(broker.acks_are_exactly_once());
    }

    #[tokio::test]
    async fn persist_failure_aborts_the_session() {
        let broker = scripted(10);
        let store = Arc::new(FlakyBlobStore::failing_after(2));
        let coordinator = coordinator(Arc::clone(&broker), store.clone());

        let err = coordinator
            .run(PullSessionConfig::synchronous(10, Duration::from_secs(30)))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, IngestError::Persist { .. }));
        assert_eq!(store.inner().len().await, 2);
        assert_eq!(broker.total_acked(), 2);
    }

    #[tokio::test]
    async fn broker_receive_failure_is_fatal() {
        let broker = Arc::new(ScriptedBroker::new());
        broker.fail_receive("subscription stream broke");
        let store = Arc::new(MemoryBlobStore::new());
        let coordinator = coordinator(Arc::clone(&broker), store.clone());

        let err = coordinator
            .run(PullSessionConfig::synchronous(5, Duration::from_secs(30)))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, IngestError::Broker { .. }));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn streaming_session_runs_to_its_deadline() {
        let broker = scripted(4);
        let store = Arc::new(MemoryBlobStore::new());
        let coordinator = coordinator(Arc::clone(&broker), store.clone());

        let report = coordinator
            .run(PullSessionConfig::streaming(Duration::from_millis(300)))
            .await
            .unwrap();

        assert_eq!(report.delivered, 4);
        assert_eq!(store.len().await, 4);
        assert!(broker.acks_are_exactly_once());
    }

    #[tokio::test]
    async fn object_keys_carry_prefix_and_message_id() {
        let broker = scripted(1);
        let store = Arc::new(MemoryBlobStore::new());
        let coordinator = coordinator(Arc::clone(&broker), store.clone());

        coordinator
            .run(PullSessionConfig::synchronous(1, Duration::from_secs(30)))
            .await
            .unwrap();

        let keys = store.keys().await;
        assert_eq!(keys.len(), 1);
        assert!(keys[0].ends_with("raw-msg-000.json"), "unexpected key {}", keys[0]);
    }
}
