//! Schema versioning.
//!
//! The base schema is created by `sql/init_transport.sql`; this module records
//! which version a database file is at and refuses to run against a file
//! written by a newer build.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Error, Result};

pub const CURRENT_VERSION: i32 = 1;

const VERSION_KEY: &str = "schema_version";

pub fn initialize_schema(conn: &Connection) -> Result<()> {
    let version = schema_version(conn)?;

    if version > CURRENT_VERSION {
        return Err(Error::DatabaseMigration {
            message: format!(
                "database schema version {version} is newer than supported version {CURRENT_VERSION}"
            ),
        });
    }

    if version < CURRENT_VERSION {
        info!("Migrating database schema from version {version} to {CURRENT_VERSION}");
        set_schema_version(conn, CURRENT_VERSION)?;
    }

    Ok(())
}

/// Returns 0 for a fresh database.
fn schema_version(conn: &Connection) -> Result<i32> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM metadata WHERE key = ?1",
            [VERSION_KEY],
            |row| row.get(0),
        )
        .optional()?;

    match value {
        None => Ok(0),
        Some(v) => v.parse().map_err(|_| Error::DatabaseMigration {
            message: format!("invalid schema version: {v}"),
        }),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
        (VERSION_KEY, version.to_string()),
    )?;
    Ok(())
}
