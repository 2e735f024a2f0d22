//! Pending domain events written in the same transaction as their account.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow)]
pub struct OutboxEntry {
    pub outbox_id: Uuid,
    pub event_type_code: String,
    /// Serialized wire envelope, published verbatim.
    pub payload: String,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub created_utc: DateTime<Utc>,
}

impl OutboxEntry {
    pub fn new(event_type_code: &str, payload: String) -> Self {
        Self {
            outbox_id: Uuid::new_v4(),
            event_type_code: event_type_code.to_string(),
            payload,
            attempts: 0,
            last_error: None,
            locked_until: None,
            created_utc: Utc::now(),
        }
    }

    pub fn is_claimable(&self, now: DateTime<Utc>) -> bool {
        self.locked_until.map_or(true, |until| until <= now)
    }
}
