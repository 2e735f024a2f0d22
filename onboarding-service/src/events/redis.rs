//! Durable named queue over Redis lists.
//!
//! Layout for queue `q` and consumer `c`:
//! - `q` ready messages; producers `LPUSH`, consumers take from the right.
//! - `q:processing:c` messages delivered to `c` and not yet settled.
//! - `q.dead-letter` settled-as-failed messages with their reason.
//!
//! A message is moved atomically from `q` to the processing list on delivery
//! (`BLMOVE`), so a consumer crash leaves it recoverable rather than lost.

use async_trait::async_trait;
use chrono::Utc;
use redis::{aio::ConnectionManager, Client};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use super::channel::{
    dead_letter_queue, ChannelError, ChannelState, Delivery, MessageSink, MessageSource,
};
use crate::config::RedisConfig;

#[derive(Debug, Serialize, Deserialize)]
struct Frame {
    delivery_id: String,
    attempt: u32,
    published_at: i64,
    body: String,
}

#[derive(Debug, Serialize)]
struct DeadLetterFrame<'a> {
    delivery_id: &'a str,
    attempt: u32,
    reason: &'a str,
    dead_lettered_at: i64,
    body: &'a str,
}

#[derive(Clone)]
pub struct RedisChannel {
    manager: ConnectionManager,
    queue: String,
    processing: String,
    state: ChannelState,
}

impl RedisChannel {
    /// Connect and declare `queue` for `consumer`. Any failure here is
    /// returned as-is; there is no retry at this layer.
    pub async fn connect(
        config: &RedisConfig,
        queue: &str,
        consumer: &str,
    ) -> Result<Self, ChannelError> {
        tracing::info!(url = %config.url, queue = %queue, "Connecting event channel to Redis");

        let client = Client::open(config.url.clone())
            .map_err(|e| ChannelError::Connect(e.to_string()))?;
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to get Redis connection manager");
            ChannelError::Connect(e.to_string())
        })?;

        let mut channel = Self {
            manager,
            queue: queue.to_string(),
            processing: format!("{}:processing:{}", queue, consumer),
            state: ChannelState::Connected,
        };
        channel.declare().await?;

        tracing::info!(queue = %channel.queue, "Event channel ready");
        Ok(channel)
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Verify the queue keys are lists (or absent) and push back anything a
    /// previous run of this consumer left unsettled.
    async fn declare(&mut self) -> Result<(), ChannelError> {
        let mut conn = self.manager.clone();

        for key in [&self.queue, &self.processing] {
            let kind: String = redis::cmd("TYPE")
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(|e| ChannelError::Declare(e.to_string()))?;
            if kind != "none" && kind != "list" {
                return Err(ChannelError::Declare(format!(
                    "key {} holds a {}, expected a list",
                    key, kind
                )));
            }
        }

        let mut recovered = 0usize;
        loop {
            let moved: Option<String> = redis::cmd("LMOVE")
                .arg(&self.processing)
                .arg(&self.queue)
                .arg("LEFT")
                .arg("RIGHT")
                .query_async(&mut conn)
                .await
                .map_err(|e| ChannelError::Declare(e.to_string()))?;
            match moved {
                Some(_) => recovered += 1,
                None => break,
            }
        }
        if recovered > 0 {
            tracing::warn!(
                queue = %self.queue,
                recovered,
                "Recovered unsettled deliveries from a previous consumer run"
            );
        }

        self.state = ChannelState::Ready;
        Ok(())
    }

    fn decode(raw: String) -> Delivery {
        match serde_json::from_str::<Frame>(&raw) {
            Ok(frame) => Delivery {
                delivery_id: frame.delivery_id,
                attempt: frame.attempt,
                body: frame.body,
                receipt: raw,
            },
            // Foreign or truncated frames still have to be settled; the
            // consumer will fail to parse the body and dead-letter it.
            Err(_) => Delivery {
                delivery_id: format!("raw-{}", Uuid::new_v4()),
                attempt: 1,
                body: raw.clone(),
                receipt: raw,
            },
        }
    }
}

#[async_trait]
impl MessageSink for RedisChannel {
    async fn send(&self, body: &str) -> Result<(), ChannelError> {
        let frame = Frame {
            delivery_id: Uuid::new_v4().to_string(),
            attempt: 1,
            published_at: Utc::now().timestamp(),
            body: body.to_string(),
        };
        let encoded = serde_json::to_string(&frame).map_err(super::EnvelopeError::from)?;

        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.queue)
            .arg(encoded)
            .query_async(&mut conn)
            .await?;

        tracing::debug!(queue = %self.queue, delivery_id = %frame.delivery_id, "Message sent");
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageSource for RedisChannel {
    async fn next_delivery(&self, wait: Duration) -> Result<Option<Delivery>, ChannelError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = redis::cmd("BLMOVE")
            .arg(&self.queue)
            .arg(&self.processing)
            .arg("RIGHT")
            .arg("LEFT")
            .arg(wait.as_secs_f64())
            .query_async(&mut conn)
            .await?;

        Ok(raw.map(Self::decode))
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), ChannelError> {
        let mut conn = self.manager.clone();
        let _: i64 = redis::cmd("LREM")
            .arg(&self.processing)
            .arg(1)
            .arg(&delivery.receipt)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), ChannelError> {
        if !requeue {
            return self.ack(delivery).await;
        }

        let frame = Frame {
            delivery_id: delivery.delivery_id.clone(),
            attempt: delivery.attempt.saturating_add(1),
            published_at: Utc::now().timestamp(),
            body: delivery.body.clone(),
        };
        let encoded = serde_json::to_string(&frame).map_err(super::EnvelopeError::from)?;

        // Requeued messages go to the consuming end so they are retried next.
        let mut conn = self.manager.clone();
        redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(&self.processing)
            .arg(1)
            .arg(&delivery.receipt)
            .ignore()
            .cmd("RPUSH")
            .arg(&self.queue)
            .arg(encoded)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), ChannelError> {
        let frame = DeadLetterFrame {
            delivery_id: &delivery.delivery_id,
            attempt: delivery.attempt,
            reason,
            dead_lettered_at: Utc::now().timestamp(),
            body: &delivery.body,
        };
        let encoded = serde_json::to_string(&frame).map_err(super::EnvelopeError::from)?;

        let mut conn = self.manager.clone();
        redis::pipe()
            .atomic()
            .cmd("LREM")
            .arg(&self.processing)
            .arg(1)
            .arg(&delivery.receipt)
            .ignore()
            .cmd("LPUSH")
            .arg(dead_letter_queue(&self.queue))
            .arg(encoded)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }
}
