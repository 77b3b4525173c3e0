//! SQLite persistence for the seen set
//!
//! [`Database`] is opened explicitly at startup and closed explicitly at
//! shutdown; there is no process-wide handle. Repositories borrow it
//! through an `Arc`.

pub mod repository;

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

pub use repository::{MemorySeenRepository, Repository, SqliteSeenRepository};

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    /// The handle was already closed
    #[error("Database is closed")]
    Closed,

    /// SQLite reported an error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Database directory could not be prepared
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking worker running the query died
    #[error("Storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Owned SQLite connection with an explicit lifecycle
pub struct Database {
    conn: Mutex<Option<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Open (or create) the database file and apply the schema
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for better concurrency
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        create_schema(&conn)?;

        tracing::info!(path = %path.display(), "SQLite database opened");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Create in-memory database (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.lock().is_some()
    }

    /// Close the connection; later use fails with [`StorageError::Closed`]
    ///
    /// Closing twice is a no-op.
    pub fn close(&self) -> StorageResult<()> {
        let Some(conn) = self.lock().take() else {
            return Ok(());
        };

        conn.close().map_err(|(_, e)| StorageError::Sqlite(e))?;
        tracing::info!("SQLite database closed");
        Ok(())
    }

    /// Run `f` against the open connection
    pub fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> StorageResult<T> {
        let guard = self.lock();
        let conn = guard.as_ref().ok_or(StorageError::Closed)?;
        Ok(f(conn)?)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
            CREATE TABLE IF NOT EXISTS seen_postings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fingerprint TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );
            "#,
    )
}
