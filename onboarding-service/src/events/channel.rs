use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use super::envelope::EnvelopeError;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Failed to connect to broker: {0}")]
    Connect(String),

    #[error("Failed to declare queue: {0}")]
    Declare(String),

    #[error("Delivery stream closed")]
    Closed,

    #[error("Broker error: {0}")]
    Broker(#[from] redis::RedisError),

    #[error("Failed to encode event: {0}")]
    Encode(#[from] EnvelopeError),
}

/// Lifecycle of a channel endpoint. Construction only succeeds once `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connected,
    /// Queue declared; endpoint usable.
    Ready,
}

/// One message handed to a consumer. Must be settled exactly once with
/// `ack`, `nack` or `dead_letter`.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub delivery_id: String,
    /// 1 on first delivery, incremented on each requeue.
    pub attempt: u32,
    pub body: String,
    /// Backend token identifying the in-flight copy.
    pub receipt: String,
}

#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Accept a body for at-least-once delivery. Success means the broker
    /// took the message, not that it was consumed.
    async fn send(&self, body: &str) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;
}

#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Wait up to `wait` for the next delivery. `Ok(None)` means nothing
    /// arrived in time; `Err(Closed)` means the stream is gone for good.
    async fn next_delivery(&self, wait: Duration) -> Result<Option<Delivery>, ChannelError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), ChannelError>;

    /// Negative acknowledgment. With `requeue` the message goes back to the
    /// head of the queue with its attempt counter bumped; without, it is dropped.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), ChannelError>;

    /// Move the message to the dead-letter destination, recording why.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), ChannelError>;
}

pub fn dead_letter_queue(queue: &str) -> String {
    format!("{}.dead-letter", queue)
}
