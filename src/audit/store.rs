use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, params_from_iter, types::Value, Connection};

use crate::audit::{ActivityLogEntry, ActivityLogFilter, LogId, NewActivityLogEntry};

/// Append-only activity log. `append` is called from inside the transaction
/// that made the change, through the same connection.
pub trait AuditLogStore: Send + Sync {
    fn append(&self, conn: &Connection, entry: &NewActivityLogEntry) -> Result<LogId>;

    fn query(&self, conn: &Connection, filter: &ActivityLogFilter) -> Result<Vec<ActivityLogEntry>>;
}

/// Stores entries in the ACTIVITY_LOG table.
#[derive(Clone, Copy, Debug, Default)]
pub struct SqliteAuditLogStore;

impl AuditLogStore for SqliteAuditLogStore {
    fn append(&self, conn: &Connection, entry: &NewActivityLogEntry) -> Result<LogId> {
        log::debug!(
            "SQL EXECUTE: INSERT INTO ACTIVITY_LOG ({} {} {})",
            entry.operation,
            entry.table_name,
            entry.record_id
        );
        conn.execute(
            "INSERT INTO ACTIVITY_LOG (table_name, operation_type, record_id, old_values, new_values,
                user_name, session_id, operation_timestamp, application_name)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                entry.table_name,
                entry.operation.as_str(),
                entry.record_id,
                entry.old_values,
                entry.new_values,
                entry.user_name,
                entry.session_id,
                entry.timestamp.timestamp_millis(),
                entry.application_name,
            ],
        )?;
        Ok(LogId(conn.last_insert_rowid()))
    }

    fn query(&self, conn: &Connection, filter: &ActivityLogFilter) -> Result<Vec<ActivityLogEntry>> {
        let mut conditions = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(table_name) = &filter.table_name {
            conditions.push("table_name = ?");
            values.push(Value::Text(table_name.to_ascii_uppercase()));
        }
        if let Some(operation) = filter.operation {
            conditions.push("operation_type = ?");
            values.push(Value::Text(operation.as_str().to_string()));
        }
        if let Some(user_name) = &filter.user_name {
            conditions.push("user_name = ?");
            values.push(Value::Text(user_name.clone()));
        }
        // A window reaching past the earliest representable instant covers
        // the whole log.
        if let Some(since) = filter.days_back.and_then(window_start) {
            conditions.push("operation_timestamp >= ?");
            values.push(Value::Integer(since.timestamp_millis()));
        }

        let mut sql = String::from(
            "SELECT log_id, table_name, operation_type, record_id, old_values, new_values,
                    user_name, session_id, operation_timestamp, application_name
             FROM ACTIVITY_LOG",
        );
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY operation_timestamp DESC, log_id DESC");

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(values))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            let operation: String = row.get(2)?;
            let millis: i64 = row.get(8)?;
            entries.push(ActivityLogEntry {
                log_id: LogId(row.get(0)?),
                table_name: row.get(1)?,
                operation: operation.parse()?,
                record_id: row.get(3)?,
                old_values: row.get(4)?,
                new_values: row.get(5)?,
                user_name: row.get(6)?,
                session_id: row.get(7)?,
                timestamp: DateTime::<Utc>::from_timestamp_millis(millis)
                    .ok_or_else(|| anyhow::anyhow!("Invalid activity timestamp {}", millis))?,
                application_name: row.get(9)?,
            });
        }
        Ok(entries)
    }
}

fn window_start(days: u32) -> Option<DateTime<Utc>> {
    Utc::now().checked_sub_signed(Duration::try_days(i64::from(days))?)
}
