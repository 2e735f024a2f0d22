//! Audit record model - append-only trail fed by the event consumer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEventType {
    #[serde(rename = "user.created")]
    UserCreated,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::UserCreated => "user.created",
        }
    }
}

/// One row per successfully handled delivery. Redelivered events produce
/// additional rows; there is no uniqueness on `user_id`.
#[derive(Debug, Clone, FromRow)]
pub struct AuditRecord {
    pub audit_id: Uuid,
    pub user_id: Uuid,
    pub event_type_code: String,
    pub payload: serde_json::Value,
    pub recorded_utc: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(user_id: Uuid, event_type: AuditEventType, payload: serde_json::Value) -> Self {
        Self {
            audit_id: Uuid::new_v4(),
            user_id,
            event_type_code: event_type.as_str().to_string(),
            payload,
            recorded_utc: Utc::now(),
        }
    }
}
