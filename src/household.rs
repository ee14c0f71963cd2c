use anyhow::Result;
use rusqlite::params;

use crate::db::{
    integer_value, DbTransaction, Filter, RowChange, RowObserver, Statement, StatementScope, Table,
};
use crate::row;

/// Member counts of one household as they stand in the INDIVIDUAL table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HouseholdCounts {
    pub total_members: i64,
    pub total_males: i64,
    pub total_females: i64,
}

impl HouseholdCounts {
    /// Fresh aggregate over the individuals currently visible to `txn`.
    pub fn count(txn: &DbTransaction, household_id: i64) -> Result<Self> {
        let counts = txn.connection().query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN sex = 'M' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN sex = 'F' THEN 1 ELSE 0 END), 0)
             FROM INDIVIDUAL WHERE household_id = ?",
            params![household_id],
            |row| {
                Ok(HouseholdCounts {
                    total_members: row.get(0)?,
                    total_males: row.get(1)?,
                    total_females: row.get(2)?,
                })
            },
        )?;
        Ok(counts)
    }
}

/// Keeps HOUSEHOLD.total_members, total_males and total_females equal to the
/// live INDIVIDUAL counts.
///
/// During the row phase of an INDIVIDUAL statement it collects every
/// household id seen on either side of the change. When the statement
/// completes each of those households is recounted from scratch and written
/// back once. The write goes through the normal write path, so it is audited
/// like any other household update, and a failure aborts the statement.
#[derive(Clone, Copy, Debug, Default)]
pub struct HouseholdAggregateRecalculator;

impl HouseholdAggregateRecalculator {
    pub fn recount(txn: &DbTransaction, household_id: i64) -> Result<HouseholdCounts> {
        let counts = HouseholdCounts::count(txn, household_id)?;
        log::debug!(
            "Recount household {}: members={} males={} females={}",
            household_id,
            counts.total_members,
            counts.total_males,
            counts.total_females
        );
        txn.execute_derived(Statement::update(
            Table::Household,
            Filter::Id(household_id),
            row! {
                "total_members" => counts.total_members,
                "total_males" => counts.total_males,
                "total_females" => counts.total_females,
            },
        ))?;
        Ok(counts)
    }
}

impl RowObserver for HouseholdAggregateRecalculator {
    fn on_row_change(
        &self,
        _txn: &DbTransaction,
        scope: &mut StatementScope,
        change: &RowChange<'_>,
    ) -> Result<()> {
        if change.table != Table::Individual {
            return Ok(());
        }
        for row in [change.old, change.new].into_iter().flatten() {
            if let Some(household_id) = integer_value(row, "household_id") {
                scope.affected_households.add(household_id);
            }
        }
        Ok(())
    }

    fn on_statement_complete(&self, txn: &DbTransaction, scope: &StatementScope) -> Result<()> {
        if scope.table() != Table::Individual {
            return Ok(());
        }
        for household_id in scope.affected_households.iter() {
            Self::recount(txn, household_id)?;
        }
        Ok(())
    }
}
