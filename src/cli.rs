use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::{FixedColumnPolicy, HeaderCollisionPolicy};

pub const DEFAULT_DB_PATH: &str = "sheet-intake.db";

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Ingest spreadsheets into per-project tables that grow with their headers",
    long_about = None
)]
pub struct Cli {
    /// SQLite database holding the project registry and project tables
    #[arg(long, global = true, default_value = DEFAULT_DB_PATH)]
    pub db: PathBuf,
    /// Optional YAML file with ingestion settings
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage registered projects
    #[command(subcommand)]
    Project(ProjectCommands),
    /// Upload a spreadsheet or delimited file into a project's table
    Ingest(IngestArgs),
    /// List the rows a user uploaded to a project
    Rows(RowsArgs),
    /// Summarize a user's uploads to a project, most recent first
    Batches(BatchesArgs),
    /// Show the columns and schema version of a project's table
    Columns(ColumnsArgs),
}

#[derive(Debug, Subcommand)]
pub enum ProjectCommands {
    /// Register a project and create its table
    Add(ProjectAddArgs),
    /// List registered projects
    List(ProjectListArgs),
    /// Rename a project together with its table
    Rename(ProjectRenameArgs),
    /// Remove a project from the registry (its table is kept)
    Delete(ProjectDeleteArgs),
}

#[derive(Debug, Args)]
pub struct ProjectAddArgs {
    /// Display name of the project
    pub name: String,
}

#[derive(Debug, Args)]
pub struct ProjectListArgs {
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ProjectRenameArgs {
    #[arg(long)]
    pub id: i64,
    /// New display name
    #[arg(long)]
    pub name: String,
}

#[derive(Debug, Args)]
pub struct ProjectDeleteArgs {
    #[arg(long)]
    pub id: i64,
}

#[derive(Debug, Args)]
pub struct IngestArgs {
    /// Registered project receiving the upload
    #[arg(short, long)]
    pub project: String,
    /// Identity recorded as the uploader of every row
    #[arg(short, long)]
    pub user: String,
    /// File to ingest (.xlsx, .xls, .ods, .csv, .tsv, ...)
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// Name recorded for the upload (defaults to the input's file name)
    #[arg(long = "file-name")]
    pub file_name: Option<String>,
    /// Worksheet to read (defaults to the first sheet)
    #[arg(long)]
    pub sheet: Option<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of delimited input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// How to treat headers that map to the same column
    #[arg(long = "header-collisions", value_enum)]
    pub header_collisions: Option<HeaderCollisionPolicy>,
    /// How to treat headers that map to a fixed column
    #[arg(long = "fixed-column-collisions", value_enum)]
    pub fixed_column_collisions: Option<FixedColumnPolicy>,
    /// Emit the ingestion summary as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct RowsArgs {
    #[arg(short, long)]
    pub project: String,
    #[arg(short, long)]
    pub user: String,
    /// Restrict to the upload made at this time (`YYYY-MM-DD HH:MM:SS`)
    #[arg(long = "batch-time", requires = "file")]
    pub batch_time: Option<String>,
    /// Restrict to the upload of this file (requires --batch-time)
    #[arg(long, requires = "batch_time")]
    pub file: Option<String>,
    /// Write the rows as CSV to this file ('-' for stdout)
    #[arg(short = 'o', long = "output", conflicts_with = "json")]
    pub output: Option<PathBuf>,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct BatchesArgs {
    #[arg(short, long)]
    pub project: String,
    #[arg(short, long)]
    pub user: String,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ColumnsArgs {
    #[arg(short, long)]
    pub project: String,
    /// Emit JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
