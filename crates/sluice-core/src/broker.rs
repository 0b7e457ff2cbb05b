//! Message-broker subscription boundary.
//!
//! The broker owns delivery: it invokes the session's handler from a pool of
//! up to `parallelism` concurrent tasks and keeps redelivering anything that
//! is never acknowledged. Everything the coordinator needs from a broker
//! client fits behind [`Subscriber`].

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{error::CoreError, message::ReceivedMessage};

/// Flow-control settings applied to one receive session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveSettings {
    /// Bounded-count mode: the broker should deliver in fixed-size request
    /// batches rather than an open stream.
    pub synchronous: bool,
    /// Ack-deadline extension window; `None` leaves the broker default
    /// (streaming sessions).
    pub max_extension: Option<Duration>,
    /// Cap on unacknowledged messages outstanding at once.
    pub max_outstanding_messages: usize,
    /// Cap on unacknowledged bytes outstanding at once.
    pub max_outstanding_bytes: usize,
    /// Number of concurrent delivery callbacks the broker may run.
    pub parallelism: usize,
}

/// Receives message deliveries for one session.
///
/// The broker invokes [`deliver`](DeliveryHandler::deliver) concurrently
/// from up to [`ReceiveSettings::parallelism`] tasks. A call may block for
/// as long as the session needs; that backpressure is how the session
/// throttles delivery.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    /// Handles one delivered message.
    async fn deliver(&self, message: ReceivedMessage);
}

/// Subscription client boundary.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Delivers messages to `handler` until `cancel` fires.
    ///
    /// Contract for implementations:
    ///
    /// - stop invoking the handler once `cancel` is triggered, let in-flight
    ///   `deliver` calls finish, and drop every clone of `handler` before
    ///   returning; callers detect the end of the delivery stream by the
    ///   handler being dropped;
    /// - return [`CoreError::Cancelled`] when stopping was caused by the
    ///   token; any other error means the subscription itself failed.
    async fn receive(
        &self,
        settings: ReceiveSettings,
        handler: Arc<dyn DeliveryHandler>,
        cancel: CancellationToken,
    ) -> Result<(), CoreError>;
}
