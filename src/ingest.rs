//! The upload pipeline: decode, normalize, evolve the schema, insert.
//!
//! Schema changes and row inserts follow different commit rules. Columns are
//! added one autocommit statement at a time before any row is written, so
//! they survive a later failure. All rows of one upload are inserted inside a
//! single transaction, so a failing row leaves none of its siblings behind.

use chrono::{Local, NaiveDateTime};
use itertools::Itertools;
use log::{debug, info};
use rusqlite::{Connection, params_from_iter};
use serde::Serialize;

use crate::{
    config::{HeaderCollisionPolicy, IngestConfig},
    decode::TabularSource,
    error::IngestError,
    evolution,
    normalize::{NormalizedUpload, normalize},
    sanitize::{Identifier, sanitize_table},
    store::{FILE_NAME_COLUMN, UPLOAD_TIME_COLUMN, UPLOADED_BY_COLUMN},
};

/// Format of the `upload_time` column. Second precision.
pub const UPLOAD_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Identifies the rows written by one upload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BatchKey {
    pub uploaded_by: String,
    pub upload_time: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub project_name: String,
    pub table: Identifier,
    pub table_created: bool,
    pub rows_inserted: usize,
    pub columns_added: Vec<Identifier>,
    pub batch: BatchKey,
}

/// Ingests `source` into the table backing `project_name`, stamping every
/// row with the current local time.
pub fn ingest(
    conn: &mut Connection,
    project_name: &str,
    source: &dyn TabularSource,
    uploader: &str,
    config: &IngestConfig,
) -> Result<IngestResult, IngestError> {
    let upload_time = Local::now().naive_local();
    ingest_at(conn, project_name, source, uploader, upload_time, config)
}

/// Same as [`ingest`] with an explicit upload timestamp.
pub fn ingest_at(
    conn: &mut Connection,
    project_name: &str,
    source: &dyn TabularSource,
    uploader: &str,
    upload_time: NaiveDateTime,
    config: &IngestConfig,
) -> Result<IngestResult, IngestError> {
    let batch = BatchKey {
        uploaded_by: uploader.to_string(),
        upload_time: upload_time.format(UPLOAD_TIME_FORMAT).to_string(),
        file_name: source.file_name().to_string(),
    };
    let table = sanitize_table(project_name);

    let sheet = source.read_sheet(config)?;
    let upload = normalize(&sheet, config);
    if config.header_collisions == HeaderCollisionPolicy::Reject
        && let Some(collision) = upload.collisions.first()
    {
        return Err(IngestError::parse(
            &batch.file_name,
            format!(
                "Headers '{}' and '{}' both map to column '{}'",
                collision.overwritten, collision.kept, collision.column
            ),
        ));
    }
    debug!(
        "Normalized '{}': {} column(s), {} row(s), {} empty row(s) skipped",
        batch.file_name,
        upload.columns.len(),
        upload.rows.len(),
        upload.empty_rows
    );

    let table_created = evolution::ensure_table(conn, &table)?;
    let columns_added = evolution::ensure_columns(conn, &table, &upload.columns)?;
    let rows_inserted = insert_rows(conn, &table, &upload, &batch)?;

    info!(
        "Ingested {} row(s) from '{}' into '{}' for {} ({} new column(s))",
        rows_inserted,
        batch.file_name,
        table,
        batch.uploaded_by,
        columns_added.len()
    );
    Ok(IngestResult {
        project_name: project_name.to_string(),
        table,
        table_created,
        rows_inserted,
        columns_added,
        batch,
    })
}

/// Inserts all rows in one transaction. Row numbers in errors are 1-based
/// positions among the rows that survived normalization; 0 means the
/// transaction could not start and the row count means the commit failed.
fn insert_rows(
    conn: &mut Connection,
    table: &Identifier,
    upload: &NormalizedUpload,
    batch: &BatchKey,
) -> Result<usize, IngestError> {
    if upload.is_empty() {
        return Ok(0);
    }
    let column_list = [UPLOADED_BY_COLUMN, UPLOAD_TIME_COLUMN, FILE_NAME_COLUMN]
        .into_iter()
        .map(str::to_string)
        .chain(upload.columns.iter().map(Identifier::quoted))
        .join(", ");
    let placeholders = (1..=upload.columns.len() + 3)
        .map(|idx| format!("?{idx}"))
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
        table.quoted()
    );
    debug!("{sql}");

    let failed_at = |row: usize| {
        move |source| IngestError::Ingestion {
            table: table.to_string(),
            row,
            source,
        }
    };
    let tx = conn.transaction().map_err(failed_at(0))?;
    {
        let mut stmt = tx.prepare(&sql).map_err(failed_at(0))?;
        for (idx, row) in upload.rows.iter().enumerate() {
            let fixed = [
                Some(batch.uploaded_by.as_str()),
                Some(batch.upload_time.as_str()),
                Some(batch.file_name.as_str()),
            ];
            let values = fixed
                .into_iter()
                .chain(row.iter().map(Option::as_deref));
            stmt.execute(params_from_iter(values))
                .map_err(failed_at(idx + 1))?;
        }
    }
    // A reader still holding the table surfaces here as a busy timeout.
    tx.commit().map_err(failed_at(upload.rows.len()))?;
    Ok(upload.rows.len())
}
