pub mod account;
pub mod audit_record;
pub mod outbox;

pub use account::{split_display_name, Account, AccountResponse};
pub use audit_record::{AuditEventType, AuditRecord};
pub use outbox::OutboxEntry;
