//! Relational store plumbing.
//!
//! Every command opens its own [`Connection`] through [`open`], which applies
//! the configured busy timeout so that lock waits and long statements fail
//! the same way on every code path. Catalog lookups used by the schema
//! evolution manager and the read side also live here.

use std::{path::Path, time::Duration};

use log::debug;
use rusqlite::{Connection, ErrorCode, OptionalExtension, params};

use crate::{config::IngestConfig, sanitize::Identifier};

/// Columns every project table carries regardless of uploaded content.
pub const ID_COLUMN: &str = "id";
pub const UPLOADED_BY_COLUMN: &str = "uploaded_by";
pub const UPLOAD_TIME_COLUMN: &str = "upload_time";
pub const FILE_NAME_COLUMN: &str = "file_name";
pub const FIXED_COLUMNS: [&str; 4] = [
    ID_COLUMN,
    UPLOADED_BY_COLUMN,
    UPLOAD_TIME_COLUMN,
    FILE_NAME_COLUMN,
];

pub fn is_fixed_column(name: &str) -> bool {
    FIXED_COLUMNS
        .iter()
        .any(|fixed| fixed.eq_ignore_ascii_case(name))
}

pub fn open(path: &Path, config: &IngestConfig) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn, config)?;
    debug!("Opened store {:?}", path);
    Ok(conn)
}

pub fn open_in_memory(config: &IngestConfig) -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn, config)?;
    Ok(conn)
}

fn configure(conn: &Connection, config: &IngestConfig) -> rusqlite::Result<()> {
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
}

pub fn table_exists(conn: &Connection, table: &Identifier) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            params![table.as_str()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Column names of `table` in declaration order; empty when the table is absent.
pub fn table_columns(conn: &Connection, table: &Identifier) -> rusqlite::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1) ORDER BY cid")?;
    let names = stmt
        .query_map(params![table.as_str()], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

/// The store rejected an `ADD COLUMN` because the column is already there.
pub fn is_duplicate_column(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(_, Some(message))
            if message.starts_with("duplicate column name")
    )
}

/// The busy timeout elapsed while waiting for a lock.
pub fn is_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _)
            if matches!(failure.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}
