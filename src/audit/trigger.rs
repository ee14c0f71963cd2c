use anyhow::Result;
use chrono::Utc;

use crate::audit::{FieldSnapshot, LogId, NewActivityLogEntry};
use crate::db::{DbTransaction, OperationKind, RowChange, RowObserver, StatementScope};

const AUDIT_SAVEPOINT: &str = "census_audit";

/// Appends one activity log entry per changed row of every audited table.
///
/// Logging is best-effort: a failed append is undone on its own and logged,
/// and the data change it describes goes ahead regardless.
#[derive(Clone, Copy, Debug, Default)]
pub struct AuditTrigger;

impl AuditTrigger {
    /// Builds the entry for `change`, or None for tables that are not audited.
    pub fn entry_for(txn: &DbTransaction, change: &RowChange<'_>) -> Result<Option<NewActivityLogEntry>> {
        let fields = change.table.audited_fields();
        if fields.is_empty() {
            return Ok(None);
        }

        let record_id = change
            .record_id()
            .ok_or_else(|| anyhow::anyhow!("{} row has no primary key", change.table))?;

        let before = match change.op {
            OperationKind::Insert => None,
            OperationKind::Update | OperationKind::Delete => change.old,
        };
        let after = match change.op {
            OperationKind::Delete => None,
            OperationKind::Insert | OperationKind::Update => change.new,
        };

        let session = txn.db().session();
        Ok(Some(NewActivityLogEntry {
            table_name: change.table.name().to_string(),
            operation: change.op,
            record_id,
            old_values: before.map(|row| FieldSnapshot::capture(fields, row).to_string()),
            new_values: after.map(|row| FieldSnapshot::capture(fields, row).to_string()),
            user_name: session.user_name.clone(),
            session_id: session.session_id.clone(),
            timestamp: Utc::now(),
            application_name: session.application_name.clone(),
        }))
    }

    fn append(txn: &DbTransaction, entry: &NewActivityLogEntry) -> Result<LogId> {
        let store = txn.db().audit_store()?;
        let conn = txn.connection();

        conn.execute_batch(&format!("SAVEPOINT {}", AUDIT_SAVEPOINT))?;
        match store.append(conn, entry) {
            Ok(log_id) => {
                conn.execute_batch(&format!("RELEASE {}", AUDIT_SAVEPOINT))?;
                Ok(log_id)
            }
            Err(err) => {
                conn.execute_batch(&format!("ROLLBACK TO {0}; RELEASE {0};", AUDIT_SAVEPOINT))?;
                Err(err)
            }
        }
    }
}

impl RowObserver for AuditTrigger {
    fn on_row_change(
        &self,
        txn: &DbTransaction,
        _scope: &mut StatementScope,
        change: &RowChange<'_>,
    ) -> Result<()> {
        let entry = match Self::entry_for(txn, change) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(()),
            Err(err) => {
                log::warn!("Skipping activity log for {} {}: {}", change.op, change.table, err);
                return Ok(());
            }
        };

        match Self::append(txn, &entry) {
            Ok(log_id) => log::debug!(
                "Logged {} {} {} as activity {}",
                entry.operation,
                entry.table_name,
                entry.record_id,
                log_id
            ),
            Err(err) => log::warn!(
                "Failed to log {} {} {}: {}",
                entry.operation,
                entry.table_name,
                entry.record_id,
                err
            ),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Db, Filter, Row, Statement, Table};
    use crate::row;

    #[test]
    fn snapshots_follow_operation_kind() -> Result<()> {
        let db = Db::open_memory()?;
        db.transaction(|txn| {
            let old: Row = row! { "geo_id" => 1_i64, "region_name" => "Ashanti", "district_name" => "Kumasi" };
            let new: Row = row! { "geo_id" => 1_i64, "region_name" => "Ashanti", "district_name" => "Obuasi" };

            let insert = RowChange { table: Table::GeographicalInfo, op: OperationKind::Insert, old: None, new: Some(&new) };
            let update = RowChange { table: Table::GeographicalInfo, op: OperationKind::Update, old: Some(&old), new: Some(&new) };
            let delete = RowChange { table: Table::GeographicalInfo, op: OperationKind::Delete, old: Some(&old), new: None };

            let insert = AuditTrigger::entry_for(txn, &insert)?.ok_or_else(|| anyhow::anyhow!("no entry"))?;
            assert!(insert.old_values.is_none());
            assert_eq!(
                insert.new_values.as_deref(),
                Some("region_name:Ashanti|district_name:Obuasi|locality_name:|enumeration_area_code:")
            );

            let update = AuditTrigger::entry_for(txn, &update)?.ok_or_else(|| anyhow::anyhow!("no entry"))?;
            assert!(update.old_values.as_deref().is_some_and(|s| s.contains("district_name:Kumasi")));
            assert!(update.new_values.as_deref().is_some_and(|s| s.contains("district_name:Obuasi")));

            let delete = AuditTrigger::entry_for(txn, &delete)?.ok_or_else(|| anyhow::anyhow!("no entry"))?;
            assert!(delete.old_values.is_some());
            assert!(delete.new_values.is_none());
            assert_eq!(delete.record_id, 1);
            assert_eq!(delete.user_name, txn.db().session().user_name);
            Ok(())
        })
    }

    #[test]
    fn broken_log_table_does_not_block_writes() -> Result<()> {
        let db = Db::open_memory()?;
        db.transaction(|txn| {
            txn.connection().execute_batch("ALTER TABLE ACTIVITY_LOG RENAME TO ACTIVITY_LOG_OLD")?;
            Ok(())
        })?;

        let ids = db.execute(Statement::insert(
            Table::GeographicalInfo,
            row! { "region_name" => "Volta", "district_name" => "Ho" },
        ))?;
        let rows = db.transaction(|txn| txn.select_rows(Table::GeographicalInfo, &Filter::Id(ids[0])))?;
        assert_eq!(rows.len(), 1);
        Ok(())
    }
}
