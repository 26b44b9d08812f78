//! `SQLite` driver for strata.
//!
//! Non-transactional work shares one connection. Each transaction opens its
//! own connection to the same database and starts with `BEGIN IMMEDIATE`, so
//! its writes stay invisible to the shared connection until commit. Database
//! files are switched to WAL mode, which lets the shared connection keep
//! reading while a transaction writes.
//!
//! In-memory databases refuse to begin transactions. A private one cannot be
//! reached from a second connection, and a shared-cache one locks written
//! tables against every other connection until commit.

#![allow(clippy::significant_drop_tightening)]

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use fromenv::FromEnv;
use parking_lot::Mutex;
use rusqlite::Connection as SqliteConnection;
use strata::{Backend, Connection, DataType, ExecResult, Row, Statement, TxConnection};
use tracing::instrument;

use crate::statement::{self, SqliteStatement};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Options used to connect to the SQL database.
///
/// This struct is used to load connection options from environment variables.
#[derive(Debug, Clone, FromEnv)]
pub struct ConnectOptions {
    /// Path or URI of the database file.
    #[env(from = "SQL_DATABASE", default = "strata.db")]
    pub database: String,
}

#[allow(missing_docs)]
impl strata::FromEnv for ConnectOptions {
    fn from_env() -> Result<Self> {
        Self::from_env().finalize().context("issue loading connection options")
    }
}

/// `SQLite` implementation of [`Connection`].
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    database: String,
    // whether a second connection sees the same database without locking it
    shareable: bool,
    // Mutex is necessary since rusqlite::Connection isn't `Sync`
    conn: Arc<Mutex<SqliteConnection>>,
}

impl Backend for SqliteBackend {
    type ConnectOptions = ConnectOptions;

    #[instrument]
    fn connect_with(options: Self::ConnectOptions) -> Result<Self> {
        tracing::debug!("initializing SQLite connection to: {}", options.database);

        let conn = open(&options.database)?;
        let journal_mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .context("failed to set journal mode")?;
        tracing::debug!("journal mode for {}: {journal_mode}", options.database);

        let shareable = !options.database.is_empty() && !journal_mode.eq_ignore_ascii_case("memory");
        Ok(Self {
            database: options.database,
            shareable,
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

impl SqliteBackend {
    /// The backend as a shareable [`Connection`] for a store.
    #[must_use]
    pub fn into_connection(self) -> Arc<dyn Connection> {
        Arc::new(self)
    }

    /// The database the backend is connected to.
    #[must_use]
    pub fn database(&self) -> &str {
        &self.database
    }

    /// Returns `true` if the database supports transactions, i.e. it is a
    /// file a second connection can open.
    #[must_use]
    pub const fn supports_transactions(&self) -> bool {
        self.shareable
    }
}

fn open(database: &str) -> Result<SqliteConnection> {
    let conn = SqliteConnection::open(database).context("failed to open SQLite database")?;
    conn.busy_timeout(BUSY_TIMEOUT).context("failed to set busy timeout")?;
    Ok(conn)
}

impl Connection for SqliteBackend {
    fn prepare(&self, sql: &str) -> Result<Arc<dyn Statement>> {
        let stmt = SqliteStatement::prepare(Arc::clone(&self.conn), sql)?;
        Ok(Arc::new(stmt))
    }

    fn exec(&self, sql: &str, params: &[DataType]) -> Result<ExecResult> {
        statement::exec(&self.conn.lock(), sql, params)
    }

    fn query(&self, sql: &str, params: &[DataType]) -> Result<Vec<Row>> {
        statement::query(&self.conn.lock(), sql, params)
    }

    fn begin(&self) -> Result<Box<dyn TxConnection>> {
        if !self.shareable {
            bail!("transactions need a database file; {:?} is held in memory", self.database);
        }

        let conn = Arc::new(Mutex::new(open(&self.database)?));
        conn.lock().execute_batch("BEGIN IMMEDIATE").context("failed to begin transaction")?;
        tracing::debug!("began transaction on {}", self.database);

        Ok(Box::new(SqliteTx { conn, finished: false }))
    }
}

/// A connection with an open `SQLite` transaction.
///
/// Rolled back on drop unless committed or rolled back explicitly.
#[derive(Debug)]
struct SqliteTx {
    conn: Arc<Mutex<SqliteConnection>>,
    finished: bool,
}

impl TxConnection for SqliteTx {
    fn rebind(&self, statement: &dyn Statement) -> Result<Arc<dyn Statement>> {
        let stmt = SqliteStatement::prepare(Arc::clone(&self.conn), statement.sql())?;
        Ok(Arc::new(stmt))
    }

    fn exec(&self, sql: &str, params: &[DataType]) -> Result<ExecResult> {
        statement::exec(&self.conn.lock(), sql, params)
    }

    fn query(&self, sql: &str, params: &[DataType]) -> Result<Vec<Row>> {
        statement::query(&self.conn.lock(), sql, params)
    }

    fn commit(mut self: Box<Self>) -> Result<(), (Box<dyn TxConnection>, anyhow::Error)> {
        let committed = self.conn.lock().execute_batch("COMMIT");
        match committed {
            Ok(()) => {
                self.finished = true;
                Ok(())
            }
            Err(e) => {
                let tx: Box<dyn TxConnection> = self;
                Err((tx, anyhow::Error::new(e).context("failed to commit transaction")))
            }
        }
    }

    fn rollback(mut self: Box<Self>) -> Result<()> {
        self.finished = true;
        self.conn.lock().execute_batch("ROLLBACK").context("failed to roll back transaction")
    }
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.conn.lock().execute_batch("ROLLBACK") {
            tracing::warn!("failed to roll back abandoned transaction: {e}");
        }
    }
}
