//! The boundary to durable storage.
//!
//! A store needs four things from its datastore: create the log table, scan
//! it in insertion order, run a body of writes atomically, and execute one
//! parameterized statement inside that body. [`SqliteDatastore`] provides
//! them over `rusqlite`; anything else can plug in by implementing
//! [`Datastore`].
//!
//! Each logical store owns one table:
//!
//! ```text
//! CREATE TABLE <table> (key TEXT, value TEXT, action TEXT)
//! ```
//!
//! One row is written per flushed command and never updated or deleted.

use crate::error::BoxError;
use rusqlite::{Connection, params_from_iter};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// One durable row: a single flushed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedRecord {
    /// `"insert"`, `"update"` or `"delete"`.
    pub action: String,
    pub key: String,
    /// Encoded value; `None` for `"delete"` rows.
    pub value: Option<String>,
}

/// Statement access inside a transaction.
pub trait Executor {
    /// Execute one parameterized statement. `None` binds SQL `NULL`.
    /// Returns the number of rows changed.
    fn execute(&self, sql: &str, params: &[Option<&str>]) -> Result<usize, BoxError>;
}

/// A durable, transactional home for command rows.
pub trait Datastore {
    /// Create `table` with the `(key, value, action)` schema unless it exists.
    fn create_table_if_not_exists(&self, table: &str) -> Result<(), BoxError>;

    /// Every row of `table`, in insertion order.
    fn scan_all(&self, table: &str) -> Result<Vec<PersistedRecord>, BoxError>;

    /// Run `body` so that its writes are committed together on success and
    /// rolled back entirely if `body` or the commit fails.
    fn run_in_transaction(
        &self,
        body: &mut dyn FnMut(&dyn Executor) -> Result<(), BoxError>,
    ) -> Result<(), BoxError>;
}

impl<D: Datastore + ?Sized> Datastore for Arc<D> {
    fn create_table_if_not_exists(&self, table: &str) -> Result<(), BoxError> {
        (**self).create_table_if_not_exists(table)
    }

    fn scan_all(&self, table: &str) -> Result<Vec<PersistedRecord>, BoxError> {
        (**self).scan_all(table)
    }

    fn run_in_transaction(
        &self,
        body: &mut dyn FnMut(&dyn Executor) -> Result<(), BoxError>,
    ) -> Result<(), BoxError> {
        (**self).run_in_transaction(body)
    }
}

/// [`Datastore`] backed by a SQLite connection.
///
/// Cloning shares the connection, so several stores (or a store and the
/// code inspecting it) can use one database.
#[derive(Debug, Clone)]
pub struct SqliteDatastore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteDatastore {
    /// Open or create a database file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BoxError> {
        Ok(SqliteDatastore::from_connection(Connection::open(path)?))
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, BoxError> {
        Ok(SqliteDatastore::from_connection(Connection::open_in_memory()?))
    }

    /// Wrap an existing connection.
    pub fn from_connection(conn: Connection) -> Self {
        SqliteDatastore {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    /// Number of rows in `table`.
    pub fn row_count(&self, table: &str) -> Result<usize, BoxError> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(usize::try_from(count)?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, BoxError> {
        self.conn
            .lock()
            .map_err(|_| "sqlite connection lock poisoned".into())
    }
}

impl Executor for Connection {
    fn execute(&self, sql: &str, params: &[Option<&str>]) -> Result<usize, BoxError> {
        Ok(Connection::execute(self, sql, params_from_iter(params.iter()))?)
    }
}

impl Datastore for SqliteDatastore {
    fn create_table_if_not_exists(&self, table: &str) -> Result<(), BoxError> {
        let conn = self.lock()?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (key TEXT, value TEXT, action TEXT)"
        ))?;
        Ok(())
    }

    fn scan_all(&self, table: &str) -> Result<Vec<PersistedRecord>, BoxError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT action, key, value FROM {table} ORDER BY rowid"
        ))?;
        let rows = stmt.query_map([], |row| {
            Ok(PersistedRecord {
                action: row.get(0)?,
                key: row.get(1)?,
                value: row.get(2)?,
            })
        })?;
        let records = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn run_in_transaction(
        &self,
        body: &mut dyn FnMut(&dyn Executor) -> Result<(), BoxError>,
    ) -> Result<(), BoxError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        // Dropping `tx` without commit rolls back.
        let executor: &dyn Executor = &*tx;
        body(executor)?;
        tx.commit()?;
        Ok(())
    }
}
