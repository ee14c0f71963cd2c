//! Activity logging: the append-only log store, the field snapshot format,
//! and the trigger that records every change to an audited table.

mod entry;
mod snapshot;
mod store;
mod trigger;

pub use entry::{ActivityLogEntry, ActivityLogFilter, LogId, NewActivityLogEntry};
pub use snapshot::FieldSnapshot;
pub use store::{AuditLogStore, SqliteAuditLogStore};
pub use trigger::AuditTrigger;
