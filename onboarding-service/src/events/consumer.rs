//! Durable consumer loop with bounded redelivery and dead-lettering.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::channel::{ChannelError, Delivery, MessageSource};
use super::envelope::AccountCreated;
use crate::config::EventsConfig;
use crate::services::metrics;

/// Consumer-side processing of one parsed event.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &AccountCreated) -> Result<(), anyhow::Error>;
}

/// How a failed delivery is retried.
#[derive(Clone, Debug)]
pub struct RedeliveryPolicy {
    /// Total deliveries allowed before dead-lettering. Zero means unbounded.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RedeliveryPolicy {
    pub fn from_config(config: &EventsConfig) -> Self {
        Self {
            max_attempts: config.max_delivery_attempts,
            initial_backoff: Duration::from_millis(config.redelivery_backoff_ms),
            max_backoff: Duration::from_millis(config.redelivery_max_backoff_ms),
            ..Default::default()
        }
    }

    /// Requeue forever with no delay.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }

    /// Delay before redelivering a message that failed on `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31) as i32;
        let backoff =
            self.initial_backoff.as_millis() as f64 * self.backoff_multiplier.powi(exponent);
        let backoff_ms = backoff.min(self.max_backoff.as_millis() as f64) as u64;
        Duration::from_millis(backoff_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Acked,
    Requeued,
    DeadLettered,
}

impl DeliveryOutcome {
    fn as_str(&self) -> &'static str {
        match self {
            DeliveryOutcome::Acked => "acked",
            DeliveryOutcome::Requeued => "requeued",
            DeliveryOutcome::DeadLettered => "dead_lettered",
        }
    }
}

/// Shared view of whether a consumer loop has died. Cloned into health checks.
#[derive(Clone, Debug, Default)]
pub struct ConsumerHealth {
    failed: Arc<AtomicBool>,
}

impl ConsumerHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }
}

pub struct EventConsumer {
    source: Arc<dyn MessageSource>,
    policy: RedeliveryPolicy,
    poll_wait: Duration,
    queue: String,
    health: ConsumerHealth,
}

impl EventConsumer {
    pub fn new(source: Arc<dyn MessageSource>, queue: &str, policy: RedeliveryPolicy) -> Self {
        Self {
            source,
            policy,
            poll_wait: Duration::from_secs(1),
            queue: queue.to_string(),
            health: ConsumerHealth::new(),
        }
    }

    pub fn health(&self) -> ConsumerHealth {
        self.health.clone()
    }

    /// Bound on each blocking fetch, and so on how long cancellation can go
    /// unnoticed while the queue is idle.
    pub fn with_poll_wait(mut self, poll_wait: Duration) -> Self {
        self.poll_wait = poll_wait;
        self
    }

    /// Process deliveries one at a time until `shutdown` fires or the stream
    /// closes. A handler call in progress always runs to completion.
    ///
    /// An error return is terminal: the consumer's health is marked failed
    /// and the process has to restart to resume consuming.
    pub async fn run<H>(&self, handler: &H, shutdown: CancellationToken) -> Result<(), ChannelError>
    where
        H: EventHandler + ?Sized,
    {
        let result = self.consume(handler, shutdown).await;
        if let Err(e) = &result {
            tracing::error!(queue = %self.queue, error = %e, "Event consumer stopped on error");
            self.health.mark_failed();
        }
        result
    }

    async fn consume<H>(&self, handler: &H, shutdown: CancellationToken) -> Result<(), ChannelError>
    where
        H: EventHandler + ?Sized,
    {
        tracing::info!(queue = %self.queue, "Event consumer started");

        loop {
            if shutdown.is_cancelled() {
                tracing::info!(queue = %self.queue, "Event consumer stopping");
                return Ok(());
            }

            let delivery = match self.source.next_delivery(self.poll_wait).await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => continue,
                Err(e) => return Err(e),
            };

            self.process(delivery, handler, &shutdown).await?;
        }
    }

    /// Parse, handle and settle one delivery.
    pub async fn process<H>(
        &self,
        delivery: Delivery,
        handler: &H,
        shutdown: &CancellationToken,
    ) -> Result<DeliveryOutcome, ChannelError>
    where
        H: EventHandler + ?Sized,
    {
        let outcome = self.settle(&delivery, handler, shutdown).await?;
        metrics::record_event_consumed(outcome.as_str());
        Ok(outcome)
    }

    async fn settle<H>(
        &self,
        delivery: &Delivery,
        handler: &H,
        shutdown: &CancellationToken,
    ) -> Result<DeliveryOutcome, ChannelError>
    where
        H: EventHandler + ?Sized,
    {
        let event = match AccountCreated::from_json(&delivery.body) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(
                    queue = %self.queue,
                    delivery_id = %delivery.delivery_id,
                    error = %e,
                    "Unparseable event, routing to dead letter"
                );
                self.source
                    .dead_letter(delivery, &format!("unparseable envelope: {}", e))
                    .await?;
                return Ok(DeliveryOutcome::DeadLettered);
            }
        };

        let Err(e) = handler.handle(&event).await else {
            self.source.ack(delivery).await?;
            tracing::debug!(
                delivery_id = %delivery.delivery_id,
                user_id = %event.user_id,
                "Event handled"
            );
            return Ok(DeliveryOutcome::Acked);
        };

        if self.policy.is_exhausted(delivery.attempt) {
            tracing::error!(
                queue = %self.queue,
                delivery_id = %delivery.delivery_id,
                user_id = %event.user_id,
                attempt = delivery.attempt,
                error = %e,
                "Handler failed on final attempt, routing to dead letter"
            );
            self.source
                .dead_letter(
                    delivery,
                    &format!("handler failed after {} attempts: {}", delivery.attempt, e),
                )
                .await?;
            return Ok(DeliveryOutcome::DeadLettered);
        }

        let backoff = self.policy.backoff_for(delivery.attempt);
        tracing::warn!(
            queue = %self.queue,
            delivery_id = %delivery.delivery_id,
            user_id = %event.user_id,
            attempt = delivery.attempt,
            backoff_ms = backoff.as_millis() as u64,
            error = %e,
            "Handler failed, requeueing"
        );

        if !backoff.is_zero() {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                _ = tokio::time::sleep(backoff) => {}
            }
        }
        self.source.nack(delivery, true).await?;
        Ok(DeliveryOutcome::Requeued)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_caps() {
        let policy = RedeliveryPolicy {
            max_attempts: 10,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(400));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(500));
        assert_eq!(policy.backoff_for(40), Duration::from_millis(500));
    }

    #[test]
    fn zero_max_attempts_never_exhausts() {
        let policy = RedeliveryPolicy::unbounded();
        assert!(!policy.is_exhausted(u32::MAX));
        assert_eq!(policy.backoff_for(7), Duration::ZERO);
    }

    #[test]
    fn exhausts_at_max_attempts() {
        let policy = RedeliveryPolicy {
            max_attempts: 3,
            ..Default::default()
        };
        assert!(!policy.is_exhausted(2));
        assert!(policy.is_exhausted(3));
    }
}
