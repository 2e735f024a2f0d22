use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPool;
use std::time::Duration;
use uuid::Uuid;

use super::{RecordStore, StoreError};
use crate::models::{Account, AuditRecord, OutboxEntry};

/// PostgreSQL-backed record store.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => StoreError::UniqueViolation,
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl RecordStore for Database {
    async fn insert_account(
        &self,
        account: &Account,
        outbox: Option<&OutboxEntry>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (user_id, email, password_hash, display_name, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(account.user_id)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(&account.display_name)
        .bind(account.created_utc)
        .bind(account.updated_utc)
        .execute(&mut *tx)
        .await
        .map_err(map_write_error)?;

        if let Some(entry) = outbox {
            sqlx::query(
                r#"
                INSERT INTO event_outbox (outbox_id, event_type_code, payload, attempts, last_error, locked_until, created_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(entry.outbox_id)
            .bind(&entry.event_type_code)
            .bind(&entry.payload)
            .bind(entry.attempts)
            .bind(&entry.last_error)
            .bind(entry.locked_until)
            .bind(entry.created_utc)
            .execute(&mut *tx)
            .await
            .map_err(map_write_error)?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn find_account_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn find_account_by_id(&self, user_id: Uuid) -> Result<Option<Account>, StoreError> {
        let account = sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn insert_audit_record(&self, record: &AuditRecord) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_records (audit_id, user_id, event_type_code, payload, recorded_utc)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.audit_id)
        .bind(record.user_id)
        .bind(&record.event_type_code)
        .bind(&record.payload)
        .bind(record.recorded_utc)
        .execute(&self.pool)
        .await
        .map_err(map_write_error)?;
        Ok(())
    }

    async fn claim_outbox_batch(
        &self,
        limit: i64,
        lease: Duration,
    ) -> Result<Vec<OutboxEntry>, StoreError> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease)
            .map_err(|e| StoreError::Unavailable(format!("Invalid outbox lease: {}", e)))?;

        let mut entries = sqlx::query_as::<_, OutboxEntry>(
            r#"
            UPDATE event_outbox
            SET locked_until = $1
            WHERE outbox_id IN (
                SELECT outbox_id FROM event_outbox
                WHERE locked_until IS NULL OR locked_until <= $2
                ORDER BY created_utc
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING *
            "#,
        )
        .bind(now + lease)
        .bind(now)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        // RETURNING does not preserve the subquery order.
        entries.sort_by_key(|e| e.created_utc);
        Ok(entries)
    }

    async fn delete_outbox_entry(&self, outbox_id: Uuid) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM event_outbox WHERE outbox_id = $1")
            .bind(outbox_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn release_outbox_entry(&self, outbox_id: Uuid, error: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE event_outbox
            SET locked_until = NULL, attempts = attempts + 1, last_error = $2
            WHERE outbox_id = $1
            "#,
        )
        .bind(outbox_id)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Database health check failed");
                StoreError::Database(e)
            })?;
        Ok(())
    }
}
