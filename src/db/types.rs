use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rusqlite::types::Value;
use serde::{Deserialize, Serialize};

use crate::db::Table;

/// A row as column name to SQLite value.
pub type Row = BTreeMap<String, Value>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Insert => "INSERT",
            OperationKind::Update => "UPDATE",
            OperationKind::Delete => "DELETE",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(OperationKind::Insert),
            "UPDATE" => Ok(OperationKind::Update),
            "DELETE" => Ok(OperationKind::Delete),
            other => Err(anyhow::anyhow!("Unknown operation kind: {}", other)),
        }
    }
}

/// One row event inside a statement. `old` is present for UPDATE and DELETE,
/// `new` for INSERT and UPDATE.
#[derive(Debug)]
pub struct RowChange<'a> {
    pub table: Table,
    pub op: OperationKind,
    pub old: Option<&'a Row>,
    pub new: Option<&'a Row>,
}

impl<'a> RowChange<'a> {
    /// Primary key of the affected row: the new row's for INSERT and UPDATE,
    /// the old row's for DELETE.
    pub fn record_id(&self) -> Option<i64> {
        let row = match self.op {
            OperationKind::Insert | OperationKind::Update => self.new,
            OperationKind::Delete => self.old,
        }?;
        match row.get(self.table.primary_key()) {
            Some(Value::Integer(id)) => Some(*id),
            _ => None,
        }
    }
}

/// Sent to subscribers after a transaction commits. Each variant includes
/// the table and the record id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DbEvent {
    Insert(Table, i64),
    Update(Table, i64),
    Delete(Table, i64),
}

impl DbEvent {
    pub fn table(&self) -> Table {
        match self {
            DbEvent::Insert(table, _) | DbEvent::Update(table, _) | DbEvent::Delete(table, _) => {
                *table
            }
        }
    }
}

/// Reads an integer column, accepting integral reals and numeric text the way
/// SQLite's type affinity would.
pub fn integer_value(row: &Row, column: &str) -> Option<i64> {
    match row.get(column)? {
        Value::Integer(i) => Some(*i),
        Value::Real(f) if f.fract() == 0.0 => Some(*f as i64),
        Value::Text(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_id_follows_operation() {
        let mut old = Row::new();
        old.insert("individual_id".to_string(), Value::Integer(7));
        let mut new = Row::new();
        new.insert("individual_id".to_string(), Value::Integer(8));

        let insert = RowChange { table: Table::Individual, op: OperationKind::Insert, old: None, new: Some(&new) };
        let delete = RowChange { table: Table::Individual, op: OperationKind::Delete, old: Some(&old), new: None };
        assert_eq!(insert.record_id(), Some(8));
        assert_eq!(delete.record_id(), Some(7));
    }

    #[test]
    fn operation_kind_parses_any_case() -> anyhow::Result<()> {
        assert_eq!("update".parse::<OperationKind>()?, OperationKind::Update);
        assert!("upsert".parse::<OperationKind>().is_err());
        Ok(())
    }
}
