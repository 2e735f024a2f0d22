//! Account model - one row per onboarded user.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::utils::PasswordHashString;

const MIN_EMAIL_LENGTH: usize = 5;

/// Account entity. `email` is unique and compared exactly as stored.
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl Account {
    pub fn new(email: String, password_hash: PasswordHashString, display_name: String) -> Self {
        let now = Utc::now();
        Self {
            user_id: Uuid::new_v4(),
            email,
            password_hash: password_hash.into_string(),
            display_name,
            created_utc: now,
            updated_utc: now,
        }
    }

    /// Domain invariants checked before the account is persisted.
    pub fn validate(&self) -> Result<(), String> {
        if self.email.trim().is_empty() {
            return Err("email is required".to_string());
        }
        if self.email.len() < MIN_EMAIL_LENGTH || !self.email.contains('@') {
            return Err("email is malformed".to_string());
        }
        if self.password_hash.is_empty() {
            return Err("password hash is required".to_string());
        }
        if self.display_name.trim().is_empty() {
            return Err("display name is required".to_string());
        }
        Ok(())
    }

    pub fn password_hash(&self) -> PasswordHashString {
        PasswordHashString::new(self.password_hash.clone())
    }

    pub fn sanitized(&self) -> AccountResponse {
        AccountResponse::from(self)
    }
}

/// Caller-safe projection of an account (no password hash).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccountResponse {
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub user_id: Uuid,
    #[schema(example = "ana@example.com")]
    pub email: String,
    #[schema(example = "Ana Ruiz")]
    pub display_name: String,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

impl From<&Account> for AccountResponse {
    fn from(a: &Account) -> Self {
        Self {
            user_id: a.user_id,
            email: a.email.clone(),
            display_name: a.display_name.clone(),
            created_utc: a.created_utc,
            updated_utc: a.updated_utc,
        }
    }
}

/// Split a display name into the first word and the trimmed remainder.
pub fn split_display_name(display_name: &str) -> (String, String) {
    let mut words = display_name.split_whitespace();
    let first = words.next().unwrap_or_default().to_string();
    let rest = words.collect::<Vec<_>>().join(" ");
    (first, rest)
}
