//! Record Store contract shared by the Postgres and in-memory backends.

mod memory;
mod postgres;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Account, AuditRecord, OutboxEntry};

pub use memory::InMemoryStore;
pub use postgres::Database;

#[derive(Error, Debug)]
pub enum StoreError {
    /// A unique constraint rejected the write.
    #[error("Unique constraint violated")]
    UniqueViolation,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Durable storage for accounts, audit records and pending events.
///
/// Lookups return `Ok(None)` on a miss; only real failures are errors.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert the account and, when given, its pending event in one
    /// transaction. Either both rows land or neither does.
    async fn insert_account(
        &self,
        account: &Account,
        outbox: Option<&OutboxEntry>,
    ) -> Result<(), StoreError>;

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    async fn find_account_by_id(&self, user_id: Uuid) -> Result<Option<Account>, StoreError>;

    async fn insert_audit_record(&self, record: &AuditRecord) -> Result<(), StoreError>;

    /// Lease up to `limit` unclaimed outbox entries, oldest first. A claimed
    /// entry is invisible to other claimers until `lease` elapses.
    async fn claim_outbox_batch(
        &self,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<OutboxEntry>, StoreError>;

    async fn delete_outbox_entry(&self, outbox_id: Uuid) -> Result<(), StoreError>;

    /// Drop the lease after a failed publish, recording the attempt.
    async fn release_outbox_entry(&self, outbox_id: Uuid, error: &str) -> Result<(), StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}
