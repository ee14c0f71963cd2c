use chrono::{SecondsFormat, Utc};

use crate::audit::{ActivityLogEntry, ActivityLogFilter};
use crate::census::entities::{entity_from_row, writable_row, CensusEntity, STAMP_COLUMNS};
use crate::db::{Db, DbTransaction, Filter, Row, Statement, Table};
use crate::error::{CensusError, CensusResult};
use crate::row;

/// Typed create, read, update and delete over the census tables.
///
/// Each call is one statement in its own transaction, so the activity log
/// and the household counts are brought up to date before it returns.
#[derive(Clone)]
pub struct CensusService {
    db: Db,
}

impl CensusService {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Db {
        &self.db
    }

    /// Inserts `entity` and returns its new id. Any id, stamps or derived
    /// counts on `entity` are ignored.
    pub fn create<E: CensusEntity>(&self, entity: &E) -> CensusResult<i64> {
        entity.validate().map_err(CensusError::InvalidInput)?;
        let mut values = writable_row(entity)?;
        let session = self.db.session();
        values.extend(row! {
            "created_by" => session.user_name.as_str(),
            "date_created" => now(),
        });

        let ids = self.db.execute(Statement::insert(E::TABLE, values))?;
        let id = ids
            .first()
            .copied()
            .ok_or_else(|| CensusError::Storage(anyhow::anyhow!("insert into {} returned no id", E::TABLE)))?;
        log::debug!("Created {} {}", E::TABLE, id);
        Ok(id)
    }

    pub fn get<E: CensusEntity>(&self, id: i64) -> CensusResult<E> {
        let row = self
            .db
            .transaction(|txn| txn.get_row(E::TABLE, id))?
            .ok_or(CensusError::NotFound { table: E::TABLE, id })?;
        Ok(entity_from_row(row)?)
    }

    pub fn list<E: CensusEntity>(&self, filter: &Filter) -> CensusResult<Vec<E>> {
        let rows = self.db.transaction(|txn| txn.select_rows(E::TABLE, filter))?;
        rows.into_iter()
            .map(|row| entity_from_row(row).map_err(CensusError::from))
            .collect()
    }

    /// Replaces every writable column of record `id` with the values on
    /// `entity`.
    pub fn update<E: CensusEntity>(&self, id: i64, entity: &E) -> CensusResult<()> {
        entity.validate().map_err(CensusError::InvalidInput)?;
        if entity.id().is_some_and(|entity_id| entity_id != id) {
            return Err(CensusError::InvalidInput(format!(
                "{} id {:?} does not match {}",
                E::TABLE,
                entity.id(),
                id
            )));
        }
        self.update_columns::<E>(id, writable_row(entity)?)
    }

    /// Updates only the given columns of record `id`.
    pub fn update_columns<E: CensusEntity>(&self, id: i64, mut values: Row) -> CensusResult<()> {
        values.retain(|column, _| {
            column != E::TABLE.primary_key()
                && !STAMP_COLUMNS.contains(&column.as_str())
                && !E::DERIVED_COLUMNS.contains(&column.as_str())
        });
        if values.is_empty() {
            return Err(CensusError::InvalidInput(format!("no writable columns for {}", E::TABLE)));
        }

        self.db.transaction(|txn| self.update_in(txn, E::TABLE, id, values))?;
        log::debug!("Updated {} {}", E::TABLE, id);
        Ok(())
    }

    pub fn delete<E: CensusEntity>(&self, id: i64) -> CensusResult<()> {
        let ids = self.db.execute(Statement::delete(E::TABLE, Filter::Id(id)))?;
        if ids.is_empty() {
            return Err(CensusError::NotFound { table: E::TABLE, id });
        }
        log::debug!("Deleted {} {}", E::TABLE, id);
        Ok(())
    }

    /// Moves an individual to another household. Both households' counts are
    /// corrected by the same statement.
    pub fn move_individual(&self, individual_id: i64, household_id: i64) -> CensusResult<()> {
        self.db.transaction(|txn| {
            if txn.get_row(Table::Household, household_id)?.is_none() {
                return Err(CensusError::NotFound { table: Table::Household, id: household_id }.into());
            }
            self.update_in(txn, Table::Individual, individual_id, row! { "household_id" => household_id })
        })?;
        log::debug!("Moved individual {} to household {}", individual_id, household_id);
        Ok(())
    }

    pub fn activity_log(&self, filter: &ActivityLogFilter) -> CensusResult<Vec<ActivityLogEntry>> {
        Ok(self.db.activity_log(filter)?)
    }

    fn update_in(&self, txn: &DbTransaction, table: Table, id: i64, mut values: Row) -> anyhow::Result<()> {
        let session = self.db.session();
        values.extend(row! {
            "modified_by" => session.user_name.as_str(),
            "date_modified" => now(),
        });
        let ids = txn.execute(Statement::update(table, Filter::Id(id), values))?;
        if ids.is_empty() {
            return Err(CensusError::NotFound { table, id }.into());
        }
        Ok(())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
