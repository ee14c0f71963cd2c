use std::cell::{Cell, RefCell};
use std::sync::Arc;

use anyhow::Result;
use rusqlite::{params_from_iter, types::Value, Params, Transaction};
use serde::de::DeserializeOwned;

use crate::db::{
    integer_value, Db, DbEvent, Filter, OperationKind, Row, RowChange, RowObserver, Statement,
    StatementScope, Table,
};
use crate::error::CensusError;

const STATEMENT_SAVEPOINT: &str = "census_statement";

pub struct DbTransaction<'a> {
    db: &'a Db,
    txn: &'a Transaction<'a>,
    pending_events: RefCell<Vec<DbEvent>>,
    derived_write: Cell<bool>,
}

impl<'a> DbTransaction<'a> {
    pub(crate) fn new(db: &'a Db, txn: &'a Transaction<'a>) -> Self {
        Self {
            db,
            txn,
            pending_events: RefCell::new(Vec::new()),
            derived_write: Cell::new(false),
        }
    }

    pub fn db(&self) -> &Db {
        self.db
    }

    pub fn connection(&self) -> &rusqlite::Connection {
        self.txn
    }

    /// Executes one statement through the observed write path.
    ///
    /// Every affected row is written and then handed to each registered
    /// observer; once all rows are done each observer's statement-complete
    /// hook runs. If anything fails the statement is rolled back as a whole
    /// and the error is returned, leaving earlier statements of the
    /// transaction intact.
    ///
    /// Returns the primary keys of the affected rows, in write order.
    pub fn execute(&self, statement: Statement) -> Result<Vec<i64>> {
        let table = statement.table();
        if table == Table::ActivityLog {
            return Err(anyhow::anyhow!(
                "{} is append-only and written only by the audit trigger",
                table
            ));
        }

        // Only the statement issued by execute_derived may name derived
        // columns. Statements nested under it by observers may not.
        let derived_write = self.derived_write.replace(false);
        if !derived_write {
            check_not_derived(&statement)?;
        }

        let observers = self.db.observers()?;
        let mut scope = StatementScope::new(table);
        let events_before = self.pending_events.borrow().len();

        self.txn.execute_batch(&format!("SAVEPOINT {}", STATEMENT_SAVEPOINT))?;
        match self.run_statement(&statement, &observers, &mut scope) {
            Ok(ids) => {
                self.txn.execute_batch(&format!("RELEASE {}", STATEMENT_SAVEPOINT))?;
                log::debug!("{:?} on {} affected {} rows", op_of(&statement), table, ids.len());
                Ok(ids)
            }
            Err(err) => {
                let rollback = format!(
                    "ROLLBACK TO {0}; RELEASE {0};",
                    STATEMENT_SAVEPOINT
                );
                if let Err(rollback_err) = self.txn.execute_batch(&rollback) {
                    log::error!("Failed to roll back statement on {}: {}", table, rollback_err);
                }
                self.pending_events.borrow_mut().truncate(events_before);
                Err(err)
            }
        }
    }

    /// Executes a statement that writes columns maintained by the write path,
    /// such as the household aggregates. Otherwise identical to `execute`.
    pub(crate) fn execute_derived(&self, statement: Statement) -> Result<Vec<i64>> {
        self.derived_write.set(true);
        let result = self.execute(statement);
        self.derived_write.set(false);
        result
    }

    pub fn query<E: DeserializeOwned, P: Params>(&self, sql: &str, params: P) -> Result<Vec<E>> {
        let mut stmt = self.txn.prepare(sql)?;
        let entities = serde_rusqlite::from_rows::<E>(stmt.query(params)?)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entities)
    }

    /// Reads rows of `table` matching `filter`, ordered by primary key.
    pub fn select_rows(&self, table: Table, filter: &Filter) -> Result<Vec<Row>> {
        let columns = self.db.table_column_names(self.txn, table)?;
        self.select_rows_checked(table, filter, &columns)
    }

    pub fn get_row(&self, table: Table, id: i64) -> Result<Option<Row>> {
        Ok(self.select_rows(table, &Filter::Id(id))?.into_iter().next())
    }

    fn run_statement(
        &self,
        statement: &Statement,
        observers: &[Arc<dyn RowObserver>],
        scope: &mut StatementScope,
    ) -> Result<Vec<i64>> {
        let table = statement.table();
        let columns = self.db.table_column_names(self.txn, table)?;
        let pk = table.primary_key();
        let mut ids = Vec::new();

        match statement {
            Statement::Insert { rows, .. } => {
                for row in rows {
                    check_columns(table, row.keys(), &columns)?;
                    let id = self.insert_row(table, row)?;
                    let new = self
                        .select_rows_checked(table, &Filter::Id(id), &columns)?
                        .into_iter()
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("Inserted {} row {} not found", table, id))?;
                    self.fire_row_change(observers, scope, OperationKind::Insert, None, Some(&new))?;
                    ids.push(id);
                }
            }
            Statement::Update { filter, values, .. } => {
                if values.is_empty() {
                    return Err(anyhow::anyhow!("Update on {} has no values", table));
                }
                if values.contains_key(pk) {
                    return Err(anyhow::anyhow!("Primary key {}.{} cannot be updated", table, pk));
                }
                check_columns(table, values.keys(), &columns)?;
                for old in self.select_rows_checked(table, filter, &columns)? {
                    let id = row_id(table, &old)?;
                    self.update_row(table, id, values)?;
                    let new = self
                        .select_rows_checked(table, &Filter::Id(id), &columns)?
                        .into_iter()
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("Updated {} row {} not found", table, id))?;
                    self.fire_row_change(observers, scope, OperationKind::Update, Some(&old), Some(&new))?;
                    ids.push(id);
                }
            }
            Statement::Delete { filter, .. } => {
                for old in self.select_rows_checked(table, filter, &columns)? {
                    let id = row_id(table, &old)?;
                    self.txn.execute(
                        &format!("DELETE FROM {} WHERE {} = ?", table.name(), pk),
                        [id],
                    )?;
                    self.fire_row_change(observers, scope, OperationKind::Delete, Some(&old), None)?;
                    ids.push(id);
                }
            }
        }

        for observer in observers {
            observer.on_statement_complete(self, scope)?;
        }

        Ok(ids)
    }

    fn fire_row_change(
        &self,
        observers: &[Arc<dyn RowObserver>],
        scope: &mut StatementScope,
        op: OperationKind,
        old: Option<&Row>,
        new: Option<&Row>,
    ) -> Result<()> {
        let change = RowChange { table: scope.table(), op, old, new };
        let id = change
            .record_id()
            .ok_or_else(|| anyhow::anyhow!("{} row has no primary key", change.table))?;

        scope.row_written();
        for observer in observers {
            observer.on_row_change(self, scope, &change)?;
        }

        let event = match op {
            OperationKind::Insert => DbEvent::Insert(change.table, id),
            OperationKind::Update => DbEvent::Update(change.table, id),
            OperationKind::Delete => DbEvent::Delete(change.table, id),
        };
        self.pending_events.borrow_mut().push(event);
        Ok(())
    }

    fn select_rows_checked(&self, table: Table, filter: &Filter, columns: &[String]) -> Result<Vec<Row>> {
        if let Some(column) = filter.column() {
            check_columns(table, std::iter::once(&column.to_string()), columns)?;
        }
        let (where_clause, params) = filter.to_sql(table);
        let sql = format!(
            "SELECT * FROM {} WHERE {} ORDER BY {}",
            table.name(),
            where_clause,
            table.primary_key()
        );
        log::debug!("SQL QUERY: {}", sql);

        let mut stmt = self.txn.prepare(&sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(params))?;

        let mut results = Vec::new();
        while let Some(sql_row) = rows.next()? {
            let mut row = Row::new();
            for (i, name) in names.iter().enumerate() {
                row.insert(name.clone(), sql_row.get::<_, Value>(i)?);
            }
            results.push(row);
        }
        Ok(results)
    }

    fn insert_row(&self, table: Table, row: &Row) -> Result<i64> {
        let sql = if row.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", table.name())
        } else {
            let columns: Vec<&str> = row.keys().map(String::as_str).collect();
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table.name(),
                columns.join(", "),
                vec!["?"; columns.len()].join(", ")
            )
        };
        log::debug!("SQL EXECUTE: {}", sql);
        self.txn.execute(&sql, params_from_iter(row.values()))?;
        Ok(self.txn.last_insert_rowid())
    }

    fn update_row(&self, table: Table, id: i64, values: &Row) -> Result<()> {
        let set_clause = values
            .keys()
            .map(|column| format!("{} = ?", column))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            table.name(),
            set_clause,
            table.primary_key()
        );
        log::debug!("SQL EXECUTE: {}", sql);

        let mut params: Vec<&Value> = values.values().collect();
        let id_value = Value::Integer(id);
        params.push(&id_value);
        self.txn.execute(&sql, params_from_iter(params))?;
        Ok(())
    }

    pub(crate) fn take_pending_events(&self) -> Vec<DbEvent> {
        std::mem::take(&mut *self.pending_events.borrow_mut())
    }
}

fn check_columns<'c>(
    table: Table,
    names: impl Iterator<Item = &'c String>,
    columns: &[String],
) -> Result<()> {
    for name in names {
        if !columns.iter().any(|c| c == name) {
            return Err(anyhow::anyhow!("Unknown column '{}' for table {}", name, table));
        }
    }
    Ok(())
}

fn check_not_derived(statement: &Statement) -> Result<()> {
    let table = statement.table();
    let derived = table.derived_columns();
    let written = match statement {
        Statement::Insert { rows, .. } => rows
            .iter()
            .flat_map(|row| row.keys())
            .find(|column| derived.contains(&column.as_str())),
        Statement::Update { values, .. } => values.keys().find(|column| derived.contains(&column.as_str())),
        Statement::Delete { .. } => None,
    };
    match written {
        Some(column) => Err(CensusError::InvalidInput(format!(
            "{}.{} is maintained by the database and cannot be written",
            table, column
        ))
        .into()),
        None => Ok(()),
    }
}

fn row_id(table: Table, row: &Row) -> Result<i64> {
    integer_value(row, table.primary_key())
        .ok_or_else(|| anyhow::anyhow!("{} row has no integer primary key", table))
}

fn op_of(statement: &Statement) -> OperationKind {
    match statement {
        Statement::Insert { .. } => OperationKind::Insert,
        Statement::Update { .. } => OperationKind::Update,
        Statement::Delete { .. } => OperationKind::Delete,
    }
}
