use std::fmt;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::FieldSnapshot;
use crate::db::OperationKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LogId(pub i64);

impl fmt::Display for LogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A row event ready to be appended. The store assigns the id.
#[derive(Clone, Debug)]
pub struct NewActivityLogEntry {
    pub table_name: String,
    pub operation: OperationKind,
    pub record_id: i64,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub user_name: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub application_name: String,
}

/// A stored activity record. Never updated or deleted once written.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    pub log_id: LogId,
    pub table_name: String,
    pub operation: OperationKind,
    pub record_id: i64,
    pub old_values: Option<String>,
    pub new_values: Option<String>,
    pub user_name: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub application_name: String,
}

impl ActivityLogEntry {
    pub fn before(&self) -> Result<Option<FieldSnapshot>> {
        self.old_values.as_deref().map(FieldSnapshot::parse).transpose()
    }

    pub fn after(&self) -> Result<Option<FieldSnapshot>> {
        self.new_values.as_deref().map(FieldSnapshot::parse).transpose()
    }
}

/// Query over the activity log. Every filter is optional and they combine
/// with AND; results are newest first.
#[derive(Clone, Debug, Default)]
pub struct ActivityLogFilter {
    pub table_name: Option<String>,
    pub operation: Option<OperationKind>,
    pub user_name: Option<String>,
    pub days_back: Option<u32>,
}

impl ActivityLogFilter {
    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn operation(mut self, operation: OperationKind) -> Self {
        self.operation = Some(operation);
        self
    }

    pub fn user(mut self, user_name: impl Into<String>) -> Self {
        self.user_name = Some(user_name.into());
        self
    }

    pub fn days_back(mut self, days: u32) -> Self {
        self.days_back = Some(days);
        self
    }
}
