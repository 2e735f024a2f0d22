//! `AccountCreated` domain event and its wire envelope.
//!
//! Wire form: `{"user_id": "<uuid>", "email": "...", "created_at": "<RFC3339>"}`.
//! Timestamps travel at second precision in UTC.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Account;

#[derive(Error, Debug)]
pub enum EnvelopeError {
    #[error("Malformed envelope: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid created_at timestamp: {0}")]
    Timestamp(String),

    #[error("Invalid user_id: {0}")]
    SubjectId(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountCreated {
    pub user_id: Uuid,
    pub email: String,
    /// Unix epoch seconds.
    pub created_at: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct WireEnvelope {
    user_id: String,
    email: String,
    created_at: String,
}

impl AccountCreated {
    pub fn from_account(account: &Account) -> Self {
        Self {
            user_id: account.user_id,
            email: account.email.clone(),
            created_at: account.created_utc.timestamp(),
        }
    }

    pub fn to_json(&self) -> Result<String, EnvelopeError> {
        Ok(serde_json::to_string(&self.wire()?)?)
    }

    /// Same shape as the wire envelope, as a JSON value for audit payloads.
    pub fn to_value(&self) -> Result<serde_json::Value, EnvelopeError> {
        Ok(serde_json::to_value(self.wire()?)?)
    }

    /// Parse a delivered body. Missing fields, wrong types, a non-UUID
    /// subject or a non-RFC3339 timestamp are all rejected.
    pub fn from_json(body: &str) -> Result<Self, EnvelopeError> {
        let wire: WireEnvelope = serde_json::from_str(body)?;

        let user_id = Uuid::parse_str(&wire.user_id)
            .map_err(|e| EnvelopeError::SubjectId(format!("{}: {}", wire.user_id, e)))?;
        let created_at = DateTime::parse_from_rfc3339(&wire.created_at)
            .map_err(|e| EnvelopeError::Timestamp(format!("{}: {}", wire.created_at, e)))?;

        Ok(Self {
            user_id,
            email: wire.email,
            created_at: created_at.timestamp(),
        })
    }

    fn wire(&self) -> Result<WireEnvelope, EnvelopeError> {
        let created_at = DateTime::<Utc>::from_timestamp(self.created_at, 0)
            .ok_or_else(|| EnvelopeError::Timestamp(format!("{} out of range", self.created_at)))?;

        Ok(WireEnvelope {
            user_id: self.user_id.to_string(),
            email: self.email.clone(),
            created_at: created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event() -> AccountCreated {
        AccountCreated {
            user_id: Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap(),
            email: "a@x.com".to_string(),
            created_at: 1_700_000_000,
        }
    }

    #[test]
    fn encodes_fixed_shape() {
        let value: serde_json::Value = serde_json::from_str(&event().to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "user_id": "550e8400-e29b-41d4-a716-446655440000",
                "email": "a@x.com",
                "created_at": "2023-11-14T22:13:20Z",
            })
        );
    }

    #[test]
    fn parses_what_it_encodes() {
        let parsed = AccountCreated::from_json(&event().to_json().unwrap()).unwrap();
        assert_eq!(parsed, event());
    }

    #[test]
    fn sub_second_precision_is_truncated() {
        let mut account = Account::new(
            "a@x.com".to_string(),
            crate::utils::PasswordHashString::new("h"),
            "Ana".to_string(),
        );
        account.created_utc = DateTime::parse_from_rfc3339("2024-05-01T10:00:00.987Z")
            .unwrap()
            .with_timezone(&Utc);

        let parsed =
            AccountCreated::from_json(&AccountCreated::from_account(&account).to_json().unwrap())
                .unwrap();
        assert_eq!(parsed.created_at, account.created_utc.timestamp());
    }

    #[test]
    fn accepts_offset_timestamps() {
        let parsed = AccountCreated::from_json(
            r#"{"user_id":"550e8400-e29b-41d4-a716-446655440000","email":"a@x.com","created_at":"2023-11-14T23:13:20+01:00"}"#,
        )
        .unwrap();
        assert_eq!(parsed.created_at, 1_700_000_000);
    }

    #[test]
    fn rejects_malformed_bodies() {
        assert!(matches!(
            AccountCreated::from_json("not json"),
            Err(EnvelopeError::Json(_))
        ));
        assert!(matches!(
            AccountCreated::from_json(r#"{"user_id":"550e8400-e29b-41d4-a716-446655440000","email":"a@x.com"}"#),
            Err(EnvelopeError::Json(_))
        ));
        assert!(matches!(
            AccountCreated::from_json(r#"{"user_id":"u-1","email":"a@x.com","created_at":"2023-11-14T22:13:20Z"}"#),
            Err(EnvelopeError::SubjectId(_))
        ));
        assert!(matches!(
            AccountCreated::from_json(r#"{"user_id":"550e8400-e29b-41d4-a716-446655440000","email":"a@x.com","created_at":"yesterday"}"#),
            Err(EnvelopeError::Timestamp(_))
        ));
        assert!(matches!(
            AccountCreated::from_json(r#"{"user_id":"550e8400-e29b-41d4-a716-446655440000","email":42,"created_at":"2023-11-14T22:13:20Z"}"#),
            Err(EnvelopeError::Json(_))
        ));
    }
}
