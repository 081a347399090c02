/// Database module for users, identity cards and transport schedules.
mod cards;
mod migrations;
mod schedules;
mod types;
mod users;

pub use types::{NewUserRow, UserFilter};

use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

use crate::error::{Error, Result};

const SCHEMA_SQL: &str = include_str!("../../../../sql/init_transport.sql");

/// Shared handle to the SQLite store. Every query goes through the one
/// connection; isolation between requests is whatever SQLite gives a single
/// connection under a mutex.
#[derive(Debug)]
pub struct TransportDb {
    path: PathBuf,
    db: Mutex<Connection>,
}

impl TransportDb {
    /// Opens (or creates) the database file and brings the schema up to date.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| Error::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        debug!("Opening database at {}", path.display());
        let conn = Connection::open(&path).map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        let db = Self::init(path, conn)?;
        info!("Database ready at {}", db.path.display());
        Ok(db)
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let path = PathBuf::from(":memory:");
        let conn = Connection::open_in_memory().map_err(|source| Error::DatabaseOpen {
            path: path.clone(),
            source,
        })?;
        Self::init(path, conn)
    }

    fn init(path: PathBuf, conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA_SQL)?;
        migrations::initialize_schema(&conn)?;
        Ok(Self {
            path,
            db: Mutex::new(conn),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A poisoned lock only means another request panicked mid-query; the
    /// connection itself is still usable.
    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
