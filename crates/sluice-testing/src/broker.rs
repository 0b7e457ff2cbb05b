//! Scripted in-memory broker with a parallel delivery pool.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use bytes::Bytes;
use sluice_core::{
    broker::{DeliveryHandler, ReceiveSettings, Subscriber},
    error::CoreError,
    message::{AckHandle, ReceivedMessage},
};
use tokio_util::sync::CancellationToken;

/// In-memory subscription that delivers scripted messages through
/// `parallelism` concurrent tasks, mimicking a broker callback pool.
///
/// Deliveries honor handler backpressure (a blocked `deliver` blocks that
/// pool task), acknowledgments are counted per message id, and `receive`
/// returns [`CoreError::Cancelled`] once the session's token fires, the way
/// the production adapter does. When the script runs dry the pool idles
/// until cancellation, like a live subscription with no traffic.
pub struct ScriptedBroker {
    pending: Arc<Mutex<VecDeque<(String, Bytes)>>>,
    acks: Arc<Mutex<HashMap<String, usize>>>,
    receive_failure: Mutex<Option<String>>,
}

impl ScriptedBroker {
    /// Creates a broker with an empty script.
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(VecDeque::new())),
            acks: Arc::new(Mutex::new(HashMap::new())),
            receive_failure: Mutex::new(None),
        }
    }

    /// Appends one message to the script.
    pub fn push_message(&self, id: impl Into<String>, payload: Bytes) {
        self.pending.lock().expect("pending lock").push_back((id.into(), payload));
    }

    /// Makes the next `receive` call fail with a broker error.
    pub fn fail_receive(&self, message: impl Into<String>) {
        *self.receive_failure.lock().expect("failure lock") = Some(message.into());
    }

    /// Messages still scripted and undelivered.
    pub fn remaining(&self) -> usize {
        self.pending.lock().expect("pending lock").len()
    }

    /// Ack count per message id.
    pub fn ack_counts(&self) -> HashMap<String, usize> {
        self.acks.lock().expect("acks lock").clone()
    }

    /// Total number of distinct acknowledged messages.
    pub fn total_acked(&self) -> usize {
        self.acks.lock().expect("acks lock").len()
    }

    /// True when every recorded ack happened exactly once.
    pub fn acks_are_exactly_once(&self) -> bool {
        self.acks.lock().expect("acks lock").values().all(|&count| count == 1)
    }
}

impl Default for ScriptedBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Subscriber for ScriptedBroker {
    async fn receive(
        &self,
        settings: ReceiveSettings,
        handler: Arc<dyn DeliveryHandler>,
        cancel: CancellationToken,
    ) -> Result<(), CoreError> {
        if let Some(message) = self.receive_failure.lock().expect("failure lock").take() {
            return Err(CoreError::broker(message));
        }

        let mut pool = Vec::with_capacity(settings.parallelism.max(1));
        for _ in 0..settings.parallelism.max(1) {
            let pending = Arc::clone(&self.pending);
            let acks = Arc::clone(&self.acks);
            let handler = Arc::clone(&handler);
            let cancel = cancel.clone();
            pool.push(tokio::spawn(async move {
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let next = pending.lock().expect("pending lock").pop_front();
                    match next {
                        Some((id, payload)) => {
                            let acker =
                                Box::new(RecordingAck { id: id.clone(), acks: Arc::clone(&acks) });
                            handler.deliver(ReceivedMessage::new(id, payload, acker)).await;
                        }
                        None => {
                            // Script exhausted: idle like a quiet subscription
                            // until the session cuts us off.
                            cancel.cancelled().await;
                            break;
                        }
                    }
                }
            }));
        }

        for task in pool {
            let _ = task.await;
        }
        drop(handler);

        if cancel.is_cancelled() {
            Err(CoreError::Cancelled)
        } else {
            Ok(())
        }
    }
}

struct RecordingAck {
    id: String,
    acks: Arc<Mutex<HashMap<String, usize>>>,
}

#[async_trait]
impl AckHandle for RecordingAck {
    async fn ack(self: Box<Self>) {
        *self.acks.lock().expect("acks lock").entry(self.id).or_insert(0) += 1;
    }
}
