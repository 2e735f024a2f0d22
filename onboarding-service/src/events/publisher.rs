use std::sync::Arc;

use super::channel::{ChannelError, MessageSink};
use super::envelope::AccountCreated;
use crate::services::metrics;

/// Publishes `AccountCreated` envelopes onto the event channel.
#[derive(Clone)]
pub struct EventPublisher {
    sink: Arc<dyn MessageSink>,
}

impl EventPublisher {
    pub fn new(sink: Arc<dyn MessageSink>) -> Self {
        Self { sink }
    }

    pub async fn publish(&self, event: &AccountCreated) -> Result<(), ChannelError> {
        let body = event.to_json()?;
        self.publish_encoded(&body).await?;
        tracing::info!(user_id = %event.user_id, "Published account created event");
        Ok(())
    }

    /// Publish a body that is already in wire form (outbox rows).
    pub async fn publish_encoded(&self, body: &str) -> Result<(), ChannelError> {
        match self.sink.send(body).await {
            Ok(()) => {
                metrics::record_event_published("ok");
                Ok(())
            }
            Err(e) => {
                metrics::record_event_published("error");
                Err(e)
            }
        }
    }

    pub async fn health_check(&self) -> Result<(), ChannelError> {
        self.sink.health_check().await
    }
}
