use async_trait::async_trait;
use std::sync::Arc;

use crate::events::{AccountCreated, EventHandler};
use crate::models::{AuditEventType, AuditRecord};
use crate::services::store::RecordStore;

/// Turns each delivered `AccountCreated` into an audit row.
///
/// Not idempotent: a redelivered event is recorded again.
pub struct AuditRecorder {
    store: Arc<dyn RecordStore>,
}

impl AuditRecorder {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl EventHandler for AuditRecorder {
    async fn handle(&self, event: &AccountCreated) -> Result<(), anyhow::Error> {
        let record = AuditRecord::new(event.user_id, AuditEventType::UserCreated, event.to_value()?);

        self.store.insert_audit_record(&record).await?;

        tracing::info!(
            audit_id = %record.audit_id,
            user_id = %event.user_id,
            "Audit record stored"
        );
        Ok(())
    }
}
