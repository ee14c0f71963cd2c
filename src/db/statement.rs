use rusqlite::types::Value;

use crate::db::{Row, Table};

/// One data-mutation operation. A statement may touch many rows, and the
/// statement-level observer phase runs once after all of them.
#[derive(Clone, Debug)]
pub enum Statement {
    Insert { table: Table, rows: Vec<Row> },
    Update { table: Table, filter: Filter, values: Row },
    Delete { table: Table, filter: Filter },
}

impl Statement {
    pub fn insert(table: Table, row: Row) -> Self {
        Statement::Insert { table, rows: vec![row] }
    }

    pub fn insert_many(table: Table, rows: Vec<Row>) -> Self {
        Statement::Insert { table, rows }
    }

    pub fn update(table: Table, filter: Filter, values: Row) -> Self {
        Statement::Update { table, filter, values }
    }

    pub fn delete(table: Table, filter: Filter) -> Self {
        Statement::Delete { table, filter }
    }

    pub fn table(&self) -> Table {
        match self {
            Statement::Insert { table, .. }
            | Statement::Update { table, .. }
            | Statement::Delete { table, .. } => *table,
        }
    }
}

/// Row selection for UPDATE and DELETE statements.
#[derive(Clone, Debug)]
pub enum Filter {
    All,
    Id(i64),
    Ids(Vec<i64>),
    Column(String, Value),
}

impl Filter {
    pub fn eq(column: &str, value: impl IntoValue) -> Self {
        Filter::Column(column.to_string(), value.into_value())
    }

    /// Renders the WHERE clause and its parameters. Column names must already
    /// be validated against the table.
    pub(crate) fn to_sql(&self, table: Table) -> (String, Vec<Value>) {
        match self {
            Filter::All => ("1 = 1".to_string(), Vec::new()),
            Filter::Id(id) => (format!("{} = ?", table.primary_key()), vec![Value::Integer(*id)]),
            // An empty IN list matches nothing.
            Filter::Ids(ids) if ids.is_empty() => ("0 = 1".to_string(), Vec::new()),
            Filter::Ids(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                (
                    format!("{} IN ({})", table.primary_key(), placeholders),
                    ids.iter().map(|id| Value::Integer(*id)).collect(),
                )
            }
            Filter::Column(column, Value::Null) => (format!("{} IS NULL", column), Vec::new()),
            Filter::Column(column, value) => (format!("{} = ?", column), vec![value.clone()]),
        }
    }

    pub(crate) fn column(&self) -> Option<&str> {
        match self {
            Filter::Column(column, _) => Some(column),
            _ => None,
        }
    }
}

/// Conversion into an SQLite value for [`row!`](crate::row).
pub trait IntoValue {
    fn into_value(self) -> Value;
}

impl IntoValue for Value {
    fn into_value(self) -> Value {
        self
    }
}

impl IntoValue for &str {
    fn into_value(self) -> Value {
        Value::Text(self.to_string())
    }
}

impl IntoValue for String {
    fn into_value(self) -> Value {
        Value::Text(self)
    }
}

impl IntoValue for i64 {
    fn into_value(self) -> Value {
        Value::Integer(self)
    }
}

impl IntoValue for i32 {
    fn into_value(self) -> Value {
        Value::Integer(self.into())
    }
}

impl IntoValue for f64 {
    fn into_value(self) -> Value {
        Value::Real(self)
    }
}

impl IntoValue for bool {
    fn into_value(self) -> Value {
        Value::Integer(self.into())
    }
}

impl<T: IntoValue> IntoValue for Option<T> {
    fn into_value(self) -> Value {
        self.map_or(Value::Null, IntoValue::into_value)
    }
}

/// Builds a [`Row`] from `column => value` pairs.
///
/// ```
/// use census_db::row;
/// let r = row! { "full_name" => "Ama", "age" => 31_i64 };
/// assert_eq!(r.len(), 2);
/// ```
#[macro_export]
macro_rules! row {
    () => { $crate::db::Row::new() };
    ($($column:expr => $value:expr),+ $(,)?) => {{
        let mut row = $crate::db::Row::new();
        $(
            row.insert(
                ($column).to_string(),
                $crate::db::IntoValue::into_value($value),
            );
        )+
        row
    }};
}
