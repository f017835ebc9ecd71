//! SQLite-backed asset and price storage.
//!
//! A single [`Database`] handle is opened per command and passed by reference
//! to every component. Writes go through [`Database::transaction`], which
//! takes the SQLite write lock up front so a reconcile-and-write sequence
//! cannot interleave with another process.

mod assets;
mod dates;
mod migrations;
mod prices;

pub use dates::{format_day, parse_day, CalendarDay};

use crate::config::Config;
use crate::{Error, Result};
use migrations::apply_migrations;
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Handle to the tally database.
pub struct Database {
    connection: Mutex<Connection>,
    path: PathBuf,
}

impl Database {
    /// Open the database configured in `config`, creating it if needed.
    pub fn open_with_config(config: &Config) -> Result<Self> {
        Self::open_at_path(
            config.database_path(),
            Duration::from_millis(config.busy_timeout_ms),
        )
    }

    /// Open (or create) a database file with the default busy timeout.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_timeout(path, Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
    }

    /// Open (or create) a database file, waiting up to `busy_timeout` for
    /// another writer's lock.
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        Self::open_at_path(path.as_ref().to_path_buf(), busy_timeout)
    }

    fn open_at_path(path: PathBuf, busy_timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!("Opening database at: {:?}", path);

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )?;
        conn.busy_timeout(busy_timeout)?;

        if let Err(e) = apply_migrations(&conn) {
            tracing::error!("Failed to apply migrations: {}", e);
            return Err(e);
        }

        Ok(Database {
            connection: Mutex::new(conn),
            path,
        })
    }

    /// Create an in-memory database (tests and dry runs).
    pub fn open_in_memory() -> Result<Self> {
        tracing::debug!("Creating in-memory database");

        let conn = Connection::open_in_memory()?;
        apply_migrations(&conn)?;

        Ok(Database {
            connection: Mutex::new(conn),
            path: PathBuf::from(":memory:"),
        })
    }

    /// Get the database path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Health check - ensure database is accessible
    pub fn health_check(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }

    /// Execute a closure with the database connection.
    pub fn with_connection<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Execute a closure inside an immediate transaction, committing on success.
    pub fn transaction<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R>,
    {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.connection
            .lock()
            .map_err(|_| Error::StorageUnavailable("database connection lock poisoned".to_string()))
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("path", &self.path).finish()
    }
}
