use std::collections::BTreeSet;

use anyhow::Result;

use crate::db::{DbTransaction, RowChange, Table};

/// A reactive procedure hooked onto the write path. Observers run
/// synchronously inside the transaction that issued the statement: once per
/// affected row, then once when the statement completes. An error from either
/// hook aborts the statement.
///
/// The connection lock is held while hooks run. Further writes must go
/// through `txn.execute`; calling `txn.db().execute(..)` or
/// `Db::transaction` from a hook deadlocks.
pub trait RowObserver: Send + Sync {
    fn on_row_change(
        &self,
        txn: &DbTransaction,
        scope: &mut StatementScope,
        change: &RowChange<'_>,
    ) -> Result<()>;

    fn on_statement_complete(&self, _txn: &DbTransaction, _scope: &StatementScope) -> Result<()> {
        Ok(())
    }
}

/// State that lives for exactly one statement. Built up during the row phase
/// and consumed by the completion phase, then dropped.
#[derive(Debug)]
pub struct StatementScope {
    table: Table,
    rows_affected: usize,
    pub affected_households: AffectedHouseholdSet,
}

impl StatementScope {
    pub(crate) fn new(table: Table) -> Self {
        Self {
            table,
            rows_affected: 0,
            affected_households: AffectedHouseholdSet::default(),
        }
    }

    pub fn table(&self) -> Table {
        self.table
    }

    pub fn rows_affected(&self) -> usize {
        self.rows_affected
    }

    pub(crate) fn row_written(&mut self) {
        self.rows_affected += 1;
    }
}

/// Household ids touched, as old or new values, by the rows of one statement.
/// Ordered so recounts run in a stable order; duplicates collapse.
#[derive(Debug, Default, Clone)]
pub struct AffectedHouseholdSet {
    ids: BTreeSet<i64>,
}

impl AffectedHouseholdSet {
    pub fn add(&mut self, household_id: i64) {
        self.ids.insert(household_id);
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn contains(&self, household_id: i64) -> bool {
        self.ids.contains(&household_id)
    }
}
