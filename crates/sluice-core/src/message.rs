//! Message and acknowledgment model for the delivery path.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

/// Acknowledgment handle for one delivered message.
///
/// Consuming the handle acknowledges the delivery with the broker. Dropping
/// it without acking leaves the message outstanding, and the broker
/// redelivers it after the ack deadline expires. Acknowledgment is
/// fire-and-forget: implementations log transport failures instead of
/// surfacing them, since an ack lost in transit also just ends in
/// redelivery.
#[async_trait]
pub trait AckHandle: Send {
    /// Acknowledges the delivery.
    async fn ack(self: Box<Self>);
}

/// One message delivered by the broker, pending acknowledgment.
///
/// Owned transiently by the delivery path: the value travels from the
/// delivery callback through the handoff queue to the consumer, and its
/// lifetime ends at [`ReceivedMessage::ack`] or when it is dropped
/// unacknowledged.
pub struct ReceivedMessage {
    /// Broker-assigned message identifier.
    pub id: String,
    /// Raw message payload.
    pub payload: Bytes,
    acker: Box<dyn AckHandle>,
}

impl ReceivedMessage {
    /// Wraps a delivered payload with its acknowledgment handle.
    pub fn new(id: impl Into<String>, payload: Bytes, acker: Box<dyn AckHandle>) -> Self {
        Self { id: id.into(), payload, acker }
    }

    /// Acknowledges the delivery, consuming the message.
    pub async fn ack(self) {
        self.acker.ack().await;
    }
}

impl fmt::Debug for ReceivedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedMessage")
            .field("id", &self.id)
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}
