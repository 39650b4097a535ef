//! Additive schema evolution for project tables.
//!
//! A project table starts with the four fixed columns and only ever grows:
//! [`ensure_columns`] adds one nullable `TEXT` column per newly seen header
//! and never drops or retypes an existing one. Each `ALTER TABLE` runs in its
//! own autocommit statement, so a failure halfway through keeps the columns
//! already added. Row inserts, by contrast, are transactional (see
//! [`crate::ingest`]).
//!
//! Concurrent uploads may discover the same new column at the same moment.
//! The loser of that race gets a "duplicate column" rejection from the store,
//! which is treated as success.

use std::collections::HashSet;

use log::{debug, info, warn};
use rusqlite::Connection;
use serde::Serialize;

use crate::{
    error::IngestError,
    sanitize::Identifier,
    store::{self, FILE_NAME_COLUMN, ID_COLUMN, UPLOAD_TIME_COLUMN, UPLOADED_BY_COLUMN},
};

/// Current column layout of a project table.
#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub table: Identifier,
    /// All columns in declaration order, fixed columns first.
    pub columns: Vec<String>,
    /// Columns discovered from uploads, in the order they were added.
    pub data_columns: Vec<String>,
}

impl TableSchema {
    /// Schema version: the number of additive migrations applied so far.
    pub fn version(&self) -> usize {
        self.data_columns.len()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns
            .iter()
            .any(|column| column.eq_ignore_ascii_case(name))
    }
}

/// Creates `table` with only the fixed columns unless it already exists.
///
/// Returns `true` when this call created the table.
pub fn ensure_table(conn: &Connection, table: &Identifier) -> Result<bool, IngestError> {
    let exists = store::table_exists(conn, table)
        .map_err(|err| IngestError::migration(table.as_str(), None, err))?;
    if exists {
        return Ok(false);
    }
    let sql = format!(
        "CREATE TABLE IF NOT EXISTS {} (\
            {ID_COLUMN} INTEGER PRIMARY KEY AUTOINCREMENT, \
            {UPLOADED_BY_COLUMN} TEXT, \
            {UPLOAD_TIME_COLUMN} TEXT, \
            {FILE_NAME_COLUMN} TEXT)",
        table.quoted()
    );
    debug!("{sql}");
    conn.execute_batch(&sql)
        .map_err(|err| IngestError::migration(table.as_str(), None, err))?;
    info!("Created table '{table}'");
    Ok(true)
}

/// Adds every column of `columns` the table does not have yet.
///
/// Names are compared case-insensitively and fixed column names are never
/// added. Returns the columns this call actually added, in request order.
pub fn ensure_columns(
    conn: &Connection,
    table: &Identifier,
    columns: &[Identifier],
) -> Result<Vec<Identifier>, IngestError> {
    let mut existing: HashSet<String> = store::table_columns(conn, table)
        .map_err(|err| IngestError::migration(table.as_str(), None, err))?
        .into_iter()
        .map(|name| name.to_ascii_lowercase())
        .collect();

    let mut added = Vec::new();
    for column in columns {
        if store::is_fixed_column(column.as_str()) || !existing.insert(column.folded()) {
            continue;
        }
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} TEXT",
            table.quoted(),
            column.quoted()
        );
        debug!("{sql}");
        match conn.execute_batch(&sql) {
            Ok(()) => added.push(column.clone()),
            Err(err) if store::is_duplicate_column(&err) => {
                warn!("Column '{column}' on '{table}' was added concurrently; continuing");
            }
            Err(err) => {
                return Err(IngestError::migration(
                    table.as_str(),
                    Some(column.as_str()),
                    err,
                ));
            }
        }
    }
    if !added.is_empty() {
        info!("Added {} column(s) to '{table}'", added.len());
    }
    Ok(added)
}

/// Reads the current layout of `table`, or `None` when it does not exist.
pub fn describe_table(
    conn: &Connection,
    table: &Identifier,
) -> Result<Option<TableSchema>, IngestError> {
    let columns = store::table_columns(conn, table)
        .map_err(|err| IngestError::store(table.as_str(), err))?;
    if columns.is_empty() {
        return Ok(None);
    }
    let data_columns = columns
        .iter()
        .filter(|name| !store::is_fixed_column(name))
        .cloned()
        .collect();
    Ok(Some(TableSchema {
        table: table.clone(),
        columns,
        data_columns,
    }))
}

/// Renames a project table. Runs on whatever transaction `conn` belongs to.
pub fn rename_table(
    conn: &Connection,
    from: &Identifier,
    to: &Identifier,
) -> Result<(), IngestError> {
    let sql = format!("ALTER TABLE {} RENAME TO {}", from.quoted(), to.quoted());
    debug!("{sql}");
    conn.execute_batch(&sql)
        .map_err(|err| IngestError::migration(from.as_str(), None, err))?;
    info!("Renamed table '{from}' to '{to}'");
    Ok(())
}
