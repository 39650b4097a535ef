//! Error taxonomy for the ingestion core.
//!
//! Store-facing failures are converted into one of these kinds at the
//! pipeline boundary, each carrying the table, column or row needed to
//! diagnose the problem from the message alone. The sanitizer and the
//! normalizer are total and never produce an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    /// The uploaded file could not be decoded. Nothing in the store changed.
    #[error("Failed to parse '{file_name}': {message}")]
    Parse { file_name: String, message: String },

    /// A DDL statement was rejected or the store was unreachable while
    /// evolving the schema. Columns added before the failure are kept.
    #[error("Schema migration failed for table '{table}'{}: {source}", column_suffix(.column))]
    SchemaMigration {
        table: String,
        column: Option<String>,
        #[source]
        source: rusqlite::Error,
    },

    /// An insert failed. Rows inserted by the same call were rolled back.
    #[error("Inserting row {row} into table '{table}' failed: {source}")]
    Ingestion {
        table: String,
        row: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Store error on table '{table}': {source}")]
    Store {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
}

fn column_suffix(column: &Option<String>) -> String {
    match column {
        Some(name) => format!(" (column '{name}')"),
        None => String::new(),
    }
}

impl IngestError {
    pub(crate) fn parse(file_name: &str, message: impl Into<String>) -> Self {
        IngestError::Parse {
            file_name: file_name.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn migration(table: &str, column: Option<&str>, source: rusqlite::Error) -> Self {
        IngestError::SchemaMigration {
            table: table.to_string(),
            column: column.map(str::to_string),
            source,
        }
    }

    pub(crate) fn store(table: &str, source: rusqlite::Error) -> Self {
        IngestError::Store {
            table: table.to_string(),
            source,
        }
    }

    /// True when the failure was caused by the busy timeout expiring.
    pub fn is_timeout(&self) -> bool {
        match self {
            IngestError::SchemaMigration { source, .. }
            | IngestError::Ingestion { source, .. }
            | IngestError::Store { source, .. } => crate::store::is_busy(source),
            IngestError::Parse { .. } => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Project name must not be empty")]
    EmptyName,

    #[error("Project {0} not found")]
    NotFound(i64),

    #[error("Table '{table}' is already used by project '{owner}'")]
    TableConflict { table: String, owner: String },

    #[error(transparent)]
    Schema(#[from] IngestError),

    #[error("Project registry error: {0}")]
    Store(#[from] rusqlite::Error),
}
