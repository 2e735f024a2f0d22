use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

use super::{RecordStore, StoreError};
use crate::models::{Account, AuditRecord, OutboxEntry};

#[derive(Default)]
struct Tables {
    accounts: Vec<Account>,
    audit_records: Vec<AuditRecord>,
    outbox: HashMap<Uuid, OutboxEntry>,
}

/// Process-local store with the same uniqueness and transaction rules as the
/// Postgres backend. Used by tests and by local runs without a database.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every operation fails with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn accounts(&self) -> Vec<Account> {
        self.lock().map(|t| t.accounts.clone()).unwrap_or_default()
    }

    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.lock().map(|t| t.audit_records.clone()).unwrap_or_default()
    }

    pub fn outbox_entries(&self) -> Vec<OutboxEntry> {
        let mut entries: Vec<OutboxEntry> = self
            .lock()
            .map(|t| t.outbox.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by_key(|e| e.created_utc);
        entries
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|e| StoreError::Unavailable(format!("In-memory store mutex poisoned: {}", e)))
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("in-memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn insert_account(
        &self,
        account: &Account,
        outbox: Option<&OutboxEntry>,
    ) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tables = self.lock()?;

        if tables
            .accounts
            .iter()
            .any(|a| a.email == account.email || a.user_id == account.user_id)
        {
            return Err(StoreError::UniqueViolation);
        }
        if let Some(entry) = outbox {
            if tables.outbox.contains_key(&entry.outbox_id) {
                return Err(StoreError::UniqueViolation);
            }
            tables.outbox.insert(entry.outbox_id, entry.clone());
        }
        tables.accounts.push(account.clone());
        Ok(())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock()?
            .accounts
            .iter()
            .find(|a| a.email == email)
            .cloned())
    }

    async fn find_account_by_id(&self, user_id: Uuid) -> Result<Option<Account>, StoreError> {
        self.check_available()?;
        Ok(self
            .lock()?
            .accounts
            .iter()
            .find(|a| a.user_id == user_id)
            .cloned())
    }

    async fn insert_audit_record(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.check_available()?;
        let mut tables = self.lock()?;
        if tables.audit_records.iter().any(|r| r.audit_id == record.audit_id) {
            return Err(StoreError::UniqueViolation);
        }
        tables.audit_records.push(record.clone());
        Ok(())
    }

    async fn claim_outbox_batch(
        &self,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        self.check_available()?;
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| StoreError::Unavailable(format!("Invalid outbox lease: {}", e)))?;
        let limit = usize::try_from(limit).unwrap_or(0);

        let mut tables = self.lock()?;
        let mut claimable: Vec<&mut OutboxEntry> = tables
            .outbox
            .values_mut()
            .filter(|e| e.is_claimable(now))
            .collect();
        claimable.sort_by_key(|e| e.created_utc);

        Ok(claimable
            .into_iter()
            .take(limit)
            .map(|entry| {
                entry.locked_until = Some(now + lease);
                entry.clone()
            })
            .collect())
    }

    async fn delete_outbox_entry(&self, outbox_id: Uuid) -> Result<(), StoreError> {
        self.check_available()?;
        self.lock()?.outbox.remove(&outbox_id);
        Ok(())
    }

    async fn release_outbox_entry(&self, outbox_id: Uuid, error: &str) -> Result<(), StoreError> {
        self.check_available()?;
        if let Some(entry) = self.lock()?.outbox.get_mut(&outbox_id) {
            entry.locked_until = None;
            entry.attempts += 1;
            entry.last_error = Some(error.to_string());
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}
