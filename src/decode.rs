//! Tabular file decoding.
//!
//! The pipeline only needs an ordered list of headers and rows of optional
//! string cells ([`RawSheet`]); anything that can produce one implements
//! [`TabularSource`]. [`SheetFile`] covers spreadsheet workbooks (through
//! `calamine`) and delimited text (through `csv`), [`MemorySheet`] serves
//! rows that are already in memory.

use std::path::{Path, PathBuf};

use calamine::{Data, DataType, Reader, open_workbook_auto};
use log::{debug, warn};

use crate::{config::IngestConfig, error::IngestError, io_utils};

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Stand-in for a blank header cell, followed by its 0-based position.
const UNNAMED_HEADER_PREFIX: &str = "Unnamed: ";

/// Headers plus rows, exactly as read from the source. Rows are padded or
/// truncated to the header width. Blank headers are named `Unnamed: N`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSheet {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RawSheet {
    fn from_records<I>(headers: Vec<String>, records: I) -> Self
    where
        I: IntoIterator<Item = Vec<Option<String>>>,
    {
        let headers: Vec<String> = headers
            .into_iter()
            .enumerate()
            .map(|(idx, header)| {
                if header.trim().is_empty() {
                    format!("{UNNAMED_HEADER_PREFIX}{idx}")
                } else {
                    header
                }
            })
            .collect();
        let width = headers.len();
        let mut truncated = 0usize;
        let rows = records
            .into_iter()
            .map(|mut row| {
                if row.len() > width && row[width..].iter().any(Option::is_some) {
                    truncated += 1;
                }
                row.resize(width, None);
                row
            })
            .collect();
        if truncated > 0 {
            warn!("{truncated} row(s) had cells beyond the header row; extra cells ignored");
        }
        RawSheet { headers, rows }
    }
}

/// Anything that can hand the pipeline a decoded table.
pub trait TabularSource {
    /// Name recorded in the `file_name` column of every ingested row.
    fn file_name(&self) -> &str;

    fn read_sheet(&self, config: &IngestConfig) -> Result<RawSheet, IngestError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SheetFormat {
    Workbook,
    Delimited,
}

impl SheetFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => Some(SheetFormat::Workbook),
            "csv" | "tsv" | "txt" => Some(SheetFormat::Delimited),
            _ => None,
        }
    }
}

/// An upload stored on disk.
#[derive(Debug, Clone)]
pub struct SheetFile {
    path: PathBuf,
    file_name: String,
}

impl SheetFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { path, file_name }
    }

    /// Overrides the recorded name, e.g. with the client-side name of a
    /// file that was spooled to a temporary path.
    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TabularSource for SheetFile {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn read_sheet(&self, config: &IngestConfig) -> Result<RawSheet, IngestError> {
        let sheet = match SheetFormat::from_path(&self.path) {
            Some(SheetFormat::Workbook) => read_workbook(&self.path, config.sheet.as_deref()),
            Some(SheetFormat::Delimited) => read_delimited(&self.path, config),
            None => Err(format!(
                "Unsupported file type {:?}",
                self.path.extension().unwrap_or_default()
            )),
        }
        .map_err(|message| IngestError::parse(&self.file_name, message))?;
        debug!(
            "Decoded {} header(s) and {} row(s) from {:?}",
            sheet.headers.len(),
            sheet.rows.len(),
            self.path
        );
        Ok(sheet)
    }
}

fn read_workbook(path: &Path, sheet: Option<&str>) -> Result<RawSheet, String> {
    let mut workbook = open_workbook_auto(path).map_err(|err| err.to_string())?;
    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| "Workbook has no sheets".to_string())?,
    };
    let range = workbook
        .worksheet_range(&sheet_name)
        .map_err(|err| format!("Reading sheet '{sheet_name}': {err}"))?;

    let mut rows = range.rows();
    let header_row = rows
        .next()
        .ok_or_else(|| format!("Sheet '{sheet_name}' has no header row"))?;
    let headers = header_row
        .iter()
        .map(|cell| cell_text(cell).unwrap_or_default())
        .collect();
    let records = rows.map(|row| row.iter().map(cell_text).collect::<Vec<_>>());
    Ok(RawSheet::from_records(headers, records))
}

fn read_delimited(path: &Path, config: &IngestConfig) -> Result<RawSheet, String> {
    let delimiter = io_utils::resolve_input_delimiter(path, config.delimiter_byte());
    let encoding =
        io_utils::resolve_encoding(config.encoding.as_deref()).map_err(|err| err.to_string())?;
    let mut reader =
        io_utils::open_csv_reader_from_path(path, delimiter).map_err(|err| format!("{err:#}"))?;
    let mut records = io_utils::read_all_records(&mut reader, encoding)
        .map_err(|err| format!("{err:#}"))?
        .into_iter();
    let headers = records
        .next()
        .ok_or_else(|| "File has no header row".to_string())?;
    let rows = records.map(|record| record.into_iter().map(Some).collect::<Vec<_>>());
    Ok(RawSheet::from_records(headers, rows))
}

/// Renders a workbook cell the way it reads in the spreadsheet. Empty and
/// error cells become `None`.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::String(text) => Some(text.clone()),
        Data::Int(value) => Some(value.to_string()),
        Data::Float(value) => Some(format_float(*value)),
        Data::Bool(value) => Some(value.to_string()),
        Data::DateTime(_) => cell
            .as_datetime()
            .map(|dt| dt.format(DATETIME_FORMAT).to_string())
            .or_else(|| cell.as_f64().map(format_float)),
        Data::DateTimeIso(text) | Data::DurationIso(text) => Some(text.clone()),
        _ => None,
    }
}

fn format_float(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

/// Rows that are already in memory, e.g. produced by another decoder.
#[derive(Debug, Clone)]
pub struct MemorySheet {
    file_name: String,
    sheet: RawSheet,
}

impl MemorySheet {
    pub fn new(file_name: impl Into<String>, sheet: RawSheet) -> Self {
        Self {
            file_name: file_name.into(),
            sheet,
        }
    }

    /// Builds a sheet from plain strings; empty strings are left for the
    /// missing-value markers to catch.
    pub fn from_strings(file_name: impl Into<String>, headers: &[&str], rows: &[&[&str]]) -> Self {
        let headers = headers.iter().map(|h| h.to_string()).collect();
        let records = rows
            .iter()
            .map(|row| row.iter().map(|cell| Some(cell.to_string())).collect::<Vec<_>>());
        Self::new(file_name, RawSheet::from_records(headers, records))
    }
}

impl TabularSource for MemorySheet {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    fn read_sheet(&self, _config: &IngestConfig) -> Result<RawSheet, IngestError> {
        Ok(self.sheet.clone())
    }
}
