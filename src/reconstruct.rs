//! Read side: flat row listings and per-upload batch summaries.
//!
//! Both queries are scoped to one uploader and one project table. A project
//! whose table does not exist yet, or has no data columns yet, reads as
//! empty rather than as an error.

use std::collections::BTreeMap;

use log::debug;
use rusqlite::{Connection, Params, Row, params, types::ValueRef};
use serde::Serialize;

use crate::{
    error::IngestError,
    evolution::{self, TableSchema},
    ingest::BatchKey,
    sanitize::{Identifier, sanitize_table},
    store::{self, FILE_NAME_COLUMN, ID_COLUMN, UPLOAD_TIME_COLUMN, UPLOADED_BY_COLUMN},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoredRow {
    pub id: i64,
    pub uploaded_by: String,
    pub upload_time: String,
    pub file_name: String,
    /// Data columns by name; columns added after this row was written hold `None`.
    pub values: BTreeMap<String, Option<String>>,
}

impl StoredRow {
    /// Value of any column, fixed or data.
    pub fn get(&self, column: &str) -> Option<&str> {
        match column {
            UPLOADED_BY_COLUMN => Some(&self.uploaded_by),
            UPLOAD_TIME_COLUMN => Some(&self.upload_time),
            FILE_NAME_COLUMN => Some(&self.file_name),
            _ => self.values.get(column).and_then(|value| value.as_deref()),
        }
    }

    /// Renders the row in `columns` order, missing values as empty strings.
    pub fn cells(&self, columns: &[String]) -> Vec<String> {
        columns
            .iter()
            .map(|column| self.get(column).unwrap_or_default().to_string())
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RowSet {
    /// Display order: `upload_time`, `file_name`, then data columns by name.
    pub columns: Vec<String>,
    pub rows: Vec<StoredRow>,
}

impl RowSet {
    /// Minimal layout returned when there is nothing to show yet.
    fn placeholder() -> Self {
        RowSet {
            columns: vec![UPLOAD_TIME_COLUMN.to_string(), FILE_NAME_COLUMN.to_string()],
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub project_name: String,
    pub table_name: Identifier,
    pub uploaded_by: String,
    pub upload_time: String,
    pub file_name: String,
    pub row_count: i64,
}

impl BatchSummary {
    pub fn key(&self) -> BatchKey {
        BatchKey {
            uploaded_by: self.uploaded_by.clone(),
            upload_time: self.upload_time.clone(),
            file_name: self.file_name.clone(),
        }
    }
}

/// Every row `uploader` has written to the project's table, oldest first.
pub fn fetch_rows(
    conn: &Connection,
    project_name: &str,
    uploader: &str,
) -> Result<RowSet, IngestError> {
    let table = sanitize_table(project_name);
    let Some(schema) = populated_schema(conn, &table)? else {
        return Ok(RowSet::placeholder());
    };
    select_rows(
        conn,
        &schema,
        &format!("WHERE {UPLOADED_BY_COLUMN} = ?1 ORDER BY {ID_COLUMN}"),
        params![uploader],
    )
}

/// The rows of a single upload.
pub fn fetch_batch_rows(
    conn: &Connection,
    project_name: &str,
    batch: &BatchKey,
) -> Result<RowSet, IngestError> {
    let table = sanitize_table(project_name);
    let Some(schema) = populated_schema(conn, &table)? else {
        return Ok(RowSet::placeholder());
    };
    select_rows(
        conn,
        &schema,
        &format!(
            "WHERE {UPLOADED_BY_COLUMN} = ?1 AND {UPLOAD_TIME_COLUMN} = ?2 \
             AND {FILE_NAME_COLUMN} = ?3 ORDER BY {ID_COLUMN}"
        ),
        params![batch.uploaded_by, batch.upload_time, batch.file_name],
    )
}

/// One summary per upload by `uploader`, most recent first.
pub fn fetch_batches(
    conn: &Connection,
    project_name: &str,
    uploader: &str,
) -> Result<Vec<BatchSummary>, IngestError> {
    let table = sanitize_table(project_name);
    let exists =
        store::table_exists(conn, &table).map_err(|err| IngestError::store(table.as_str(), err))?;
    if !exists {
        debug!("No table '{table}' yet; no batches for project '{project_name}'");
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {UPLOADED_BY_COLUMN}, {UPLOAD_TIME_COLUMN}, {FILE_NAME_COLUMN}, COUNT({ID_COLUMN}) \
         FROM {} WHERE {UPLOADED_BY_COLUMN} = ?1 \
         GROUP BY {UPLOADED_BY_COLUMN}, {UPLOAD_TIME_COLUMN}, {FILE_NAME_COLUMN} \
         ORDER BY {UPLOAD_TIME_COLUMN} DESC, {FILE_NAME_COLUMN}",
        table.quoted()
    );
    let to_store_error = |err| IngestError::store(table.as_str(), err);
    let mut stmt = conn.prepare(&sql).map_err(to_store_error)?;
    let batches = stmt
        .query_map(params![uploader], |row| {
            Ok(BatchSummary {
                project_name: project_name.to_string(),
                table_name: table.clone(),
                uploaded_by: text(row, 0)?.unwrap_or_default(),
                upload_time: text(row, 1)?.unwrap_or_default(),
                file_name: text(row, 2)?.unwrap_or_default(),
                row_count: row.get(3)?,
            })
        })
        .map_err(to_store_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(to_store_error)?;
    Ok(batches)
}

/// Schema of `table` when it exists and has at least one data column.
fn populated_schema(
    conn: &Connection,
    table: &Identifier,
) -> Result<Option<TableSchema>, IngestError> {
    let schema = evolution::describe_table(conn, table)?;
    Ok(schema.filter(|schema| !schema.data_columns.is_empty()))
}

fn select_rows<P: Params>(
    conn: &Connection,
    schema: &TableSchema,
    filter: &str,
    params: P,
) -> Result<RowSet, IngestError> {
    let table = &schema.table;
    let to_store_error = |err| IngestError::store(table.as_str(), err);
    let sql = format!("SELECT * FROM {} {filter}", table.quoted());
    let mut stmt = conn.prepare(&sql).map_err(to_store_error)?;
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let rows = stmt
        .query_map(params, |row| {
            let mut stored = StoredRow::default();
            for (idx, name) in names.iter().enumerate() {
                match name.as_str() {
                    ID_COLUMN => stored.id = row.get(idx)?,
                    UPLOADED_BY_COLUMN => stored.uploaded_by = text(row, idx)?.unwrap_or_default(),
                    UPLOAD_TIME_COLUMN => stored.upload_time = text(row, idx)?.unwrap_or_default(),
                    FILE_NAME_COLUMN => stored.file_name = text(row, idx)?.unwrap_or_default(),
                    _ => {
                        stored.values.insert(name.clone(), text(row, idx)?);
                    }
                }
            }
            Ok(stored)
        })
        .map_err(to_store_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(to_store_error)?;

    let mut data_columns = schema.data_columns.clone();
    data_columns.sort();
    let columns = [UPLOAD_TIME_COLUMN.to_string(), FILE_NAME_COLUMN.to_string()]
        .into_iter()
        .chain(data_columns)
        .collect();
    debug!("Fetched {} row(s) from '{table}'", rows.len());
    Ok(RowSet { columns, rows })
}

/// Reads a cell as text whatever its storage class. Tables written by other
/// SQL clients may hold numbers in data columns.
fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Integer(value) => Some(value.to_string()),
        ValueRef::Real(value) => Some(value.to_string()),
        ValueRef::Text(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Some(format!("<{} bytes>", bytes.len())),
    })
}
