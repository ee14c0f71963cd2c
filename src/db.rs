use std::path::Path;
use std::sync::{mpsc::Receiver, Arc, Mutex, RwLock};

use anyhow::Result;
use include_dir::{include_dir, Dir};
use rusqlite::{Connection, Params};
use rusqlite_migration::Migrations;
use serde::de::DeserializeOwned;

use crate::audit::{ActivityLogEntry, ActivityLogFilter, AuditLogStore, AuditTrigger, SqliteAuditLogStore};
use crate::config::{CensusConfig, DatabaseLocation, SessionContext};
use crate::household::HouseholdAggregateRecalculator;
use crate::notifier::Notifier;

mod observer;
mod statement;
mod table;
mod transaction;
mod types;

pub use observer::{AffectedHouseholdSet, RowObserver, StatementScope};
pub use statement::{Filter, IntoValue, Statement};
pub use table::Table;
pub use transaction::DbTransaction;
pub use types::{integer_value, DbEvent, OperationKind, Row, RowChange};

static MIGRATIONS_DIR: Dir = include_dir!("$CARGO_MANIFEST_DIR/migrations");

/// Handle to the census database. Clones share the connection, the observer
/// registry and the event subscribers.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
    observers: Arc<RwLock<Vec<Arc<dyn RowObserver>>>>,
    audit_store: Arc<RwLock<Arc<dyn AuditLogStore>>>,
    notifier: Notifier<DbEvent>,
    session: Arc<SessionContext>,
}

impl Db {
    pub fn open_memory() -> Result<Self> {
        Self::open_with_config(&CensusConfig::default())
    }

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(&CensusConfig {
            database: DatabaseLocation::File(path.as_ref().to_path_buf()),
            ..Default::default()
        })
    }

    pub fn open_with_config(config: &CensusConfig) -> Result<Self> {
        let conn = match &config.database {
            DatabaseLocation::Memory => Connection::open_in_memory()?,
            DatabaseLocation::File(path) => Connection::open(path)?,
        };
        let session = SessionContext::new(&config.user_name, &config.application_name);
        Self::from_connection(conn, session)
    }

    fn from_connection(mut conn: Connection, session: SessionContext) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;

        let migrations = Migrations::from_directory(&MIGRATIONS_DIR)?;
        migrations.to_latest(&mut conn)?;

        log::debug!(
            "Opened census database for user {} (session {})",
            session.user_name,
            session.session_id
        );

        let observers: Vec<Arc<dyn RowObserver>> = vec![
            Arc::new(AuditTrigger),
            Arc::new(HouseholdAggregateRecalculator),
        ];

        Ok(Db {
            conn: Arc::new(Mutex::new(conn)),
            observers: Arc::new(RwLock::new(observers)),
            audit_store: Arc::new(RwLock::new(Arc::new(SqliteAuditLogStore))),
            notifier: Notifier::new(),
            session: Arc::new(session),
        })
    }

    /// A handle on the same database acting as another user, with its own
    /// session id.
    pub fn as_user(&self, user_name: &str) -> Db {
        Db {
            session: Arc::new(SessionContext::new(user_name, &self.session.application_name)),
            ..self.clone()
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Adds an observer after the built-in ones. It runs for every statement
    /// on every table.
    pub fn register_observer(&self, observer: Arc<dyn RowObserver>) -> Result<()> {
        self.observers
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on observers"))?
            .push(observer);
        Ok(())
    }

    pub(crate) fn observers(&self) -> Result<Vec<Arc<dyn RowObserver>>> {
        Ok(self
            .observers
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on observers"))?
            .clone())
    }

    pub fn audit_store(&self) -> Result<Arc<dyn AuditLogStore>> {
        Ok(self
            .audit_store
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on audit store"))?
            .clone())
    }

    /// Swaps the store the audit trigger appends to and activity queries read
    /// from.
    pub fn set_audit_store(&self, store: Arc<dyn AuditLogStore>) -> Result<()> {
        *self
            .audit_store
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on audit store"))? = store;
        Ok(())
    }

    /// Subscribe to be notified of every committed insert, update, or delete.
    /// Dropped Receivers will be lazily cleaned up.
    pub fn subscribe(&self) -> Receiver<DbEvent> {
        self.notifier.observer()
    }

    /// Calls the supplied closure with a database transaction that can be
    /// used to perform writes to the database. Commits automatically
    /// if the closure returns Ok, otherwise rolls back. Subscribers are
    /// notified only after a successful commit.
    ///
    /// Not reentrant: calling it from inside `f` or from a `RowObserver`
    /// deadlocks. Use the supplied `DbTransaction` instead.
    pub fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&DbTransaction) -> Result<R>,
    {
        let (result, events) = {
            let mut conn = self
                .conn
                .lock()
                .map_err(|_| anyhow::anyhow!("Failed to acquire connection lock"))?;
            let txn = conn.transaction()?;
            let db_txn = DbTransaction::new(self, &txn);
            let result = f(&db_txn)?;
            let events = db_txn.take_pending_events();
            drop(db_txn);
            txn.commit()?;
            (result, events)
        };

        for event in events {
            self.notifier.notify(event);
        }

        Ok(result)
    }

    /// Shortcut to run a single statement in its own transaction.
    /// See DbTransaction.execute()
    pub fn execute(&self, statement: Statement) -> Result<Vec<i64>> {
        self.transaction(|txn| txn.execute(statement))
    }

    /// Shortcut to create a transaction and execute a query.
    /// See DbTransaction.query()
    pub fn query<E: DeserializeOwned, P: Params>(&self, sql: &str, params: P) -> Result<Vec<E>> {
        self.transaction(|txn| txn.query(sql, params))
    }

    pub fn activity_log(&self, filter: &ActivityLogFilter) -> Result<Vec<ActivityLogEntry>> {
        let store = self.audit_store()?;
        self.transaction(|txn| store.query(txn.connection(), filter))
    }

    pub(crate) fn table_column_names(&self, conn: &Connection, table: Table) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table.name()))?;
        let columns = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(anyhow::anyhow!("Table '{}' not found or has no columns", table));
        }

        Ok(columns)
    }
}
