//! Dispatcher that drains the transactional outbox onto the event channel.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::publisher::EventPublisher;
use crate::config::EventsConfig;
use crate::services::metrics;
use crate::services::store::{RecordStore, StoreError};

pub struct OutboxDispatcher {
    store: Arc<dyn RecordStore>,
    publisher: EventPublisher,
    wake: Arc<Notify>,
    poll_interval: Duration,
    batch_size: i64,
    lease: Duration,
}

impl OutboxDispatcher {
    pub fn new(
        store: Arc<dyn RecordStore>,
        publisher: EventPublisher,
        wake: Arc<Notify>,
        config: &EventsConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            wake,
            poll_interval: Duration::from_millis(config.outbox_poll_interval_ms),
            batch_size: config.outbox_batch_size,
            lease: Duration::from_secs(config.outbox_lease_seconds),
        }
    }

    /// Publish one leased batch. Rows are deleted once the broker accepts
    /// them and released with the error otherwise. Returns how many were
    /// published.
    pub async fn dispatch_pending(&self) -> Result<usize, StoreError> {
        let entries = self
            .store
            .claim_outbox_batch(self.batch_size, self.lease)
            .await?;

        let mut published = 0;
        for entry in entries {
            match self.publisher.publish_encoded(&entry.payload).await {
                Ok(()) => {
                    self.store.delete_outbox_entry(entry.outbox_id).await?;
                    metrics::record_outbox_dispatched("published");
                    published += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        outbox_id = %entry.outbox_id,
                        attempts = entry.attempts + 1,
                        error = %e,
                        "Outbox publish failed, releasing entry"
                    );
                    metrics::record_outbox_dispatched("failed");
                    self.store
                        .release_outbox_entry(entry.outbox_id, &e.to_string())
                        .await?;
                }
            }
        }

        if published > 0 {
            tracing::debug!(published, "Outbox batch dispatched");
        }
        Ok(published)
    }

    /// Drain on every wake-up or poll tick until `shutdown` fires.
    pub async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            batch_size = self.batch_size,
            "Outbox dispatcher started"
        );

        loop {
            loop {
                match self.dispatch_pending().await {
                    Ok(n) if n as i64 >= self.batch_size => continue,
                    Ok(_) => break,
                    Err(e) => {
                        tracing::error!(error = %e, "Outbox dispatch failed");
                        break;
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Outbox dispatcher stopping");
                    return;
                }
                _ = self.wake.notified() => {}
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }
}
