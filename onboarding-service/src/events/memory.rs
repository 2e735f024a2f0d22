//! In-process channel with the same settle semantics as the Redis backend.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

use super::channel::{ChannelError, Delivery, MessageSink, MessageSource};

#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub delivery: Delivery,
    pub reason: String,
}

#[derive(Default)]
struct Queues {
    ready: VecDeque<Delivery>,
    in_flight: HashMap<String, Delivery>,
    dead_letters: Vec<DeadLetter>,
    sent: usize,
    closed: bool,
}

/// Cloneable handle; every clone shares one queue.
#[derive(Clone, Default)]
pub struct MemoryChannel {
    queues: Arc<Mutex<Queues>>,
    available: Arc<Notify>,
    fail_sends: Arc<AtomicBool>,
}

impl MemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a raw body as if a producer had sent it.
    pub fn inject(&self, body: &str) {
        if let Ok(mut queues) = self.lock() {
            queues.ready.push_back(new_delivery(body));
        }
        self.available.notify_one();
    }

    /// While set, `send` fails as if the broker were unreachable.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// Close the delivery stream; waiting and future consumers get `Closed`.
    pub fn close(&self) {
        if let Ok(mut queues) = self.lock() {
            queues.closed = true;
        }
        self.available.notify_waiters();
    }

    pub fn pending(&self) -> Vec<Delivery> {
        self.lock()
            .map(|q| q.ready.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock().map(|q| q.in_flight.len()).unwrap_or_default()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.lock()
            .map(|q| q.dead_letters.clone())
            .unwrap_or_default()
    }

    /// Number of messages accepted by `send` so far.
    pub fn sent_count(&self) -> usize {
        self.lock().map(|q| q.sent).unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Queues>, ChannelError> {
        self.queues.lock().map_err(|_| ChannelError::Closed)
    }

    fn take_in_flight(&self, delivery: &Delivery) -> Result<Option<Delivery>, ChannelError> {
        Ok(self.lock()?.in_flight.remove(&delivery.receipt))
    }
}

fn new_delivery(body: &str) -> Delivery {
    let delivery_id = Uuid::new_v4().to_string();
    Delivery {
        receipt: delivery_id.clone(),
        delivery_id,
        attempt: 1,
        body: body.to_string(),
    }
}

#[async_trait]
impl MessageSink for MemoryChannel {
    async fn send(&self, body: &str) -> Result<(), ChannelError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(ChannelError::Connect("memory broker unreachable".to_string()));
        }
        {
            let mut queues = self.lock()?;
            if queues.closed {
                return Err(ChannelError::Closed);
            }
            queues.ready.push_back(new_delivery(body));
            queues.sent += 1;
        }
        self.available.notify_one();
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        if self.lock()?.closed {
            return Err(ChannelError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl MessageSource for MemoryChannel {
    async fn next_delivery(&self, wait: Duration) -> Result<Option<Delivery>, ChannelError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let notified = self.available.notified();
            {
                let mut queues = self.lock()?;
                if queues.closed {
                    return Err(ChannelError::Closed);
                }
                if let Some(delivery) = queues.ready.pop_front() {
                    queues
                        .in_flight
                        .insert(delivery.receipt.clone(), delivery.clone());
                    return Ok(Some(delivery));
                }
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), ChannelError> {
        self.take_in_flight(delivery)?;
        Ok(())
    }

    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), ChannelError> {
        let Some(mut settled) = self.take_in_flight(delivery)? else {
            return Ok(());
        };
        if requeue {
            settled.attempt = settled.attempt.saturating_add(1);
            self.lock()?.ready.push_front(settled);
            self.available.notify_one();
        }
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<(), ChannelError> {
        let mut queues = self.lock()?;
        let settled = queues
            .in_flight
            .remove(&delivery.receipt)
            .unwrap_or_else(|| delivery.clone());
        queues.dead_letters.push(DeadLetter {
            delivery: settled,
            reason: reason.to_string(),
        });
        Ok(())
    }
}
