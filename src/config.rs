//! Ingestion settings loaded from an optional YAML file.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. Command-line flags override file values.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Cell values spreadsheet readers conventionally treat as missing.
const DEFAULT_MISSING_MARKERS: &[&str] = &[
    "", "#N/A", "#N/A N/A", "#NA", "-1.#IND", "-1.#QNAN", "-NaN", "-nan", "1.#IND", "1.#QNAN",
    "<NA>", "N/A", "NA", "NULL", "NaN", "None", "n/a", "nan", "null",
];

/// What to do when two headers of one file sanitize to the same column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum HeaderCollisionPolicy {
    /// The later header's value replaces the earlier one in every row.
    #[default]
    LastWriteWins,
    /// Abort the upload before touching the store.
    Reject,
}

/// What to do with a header that sanitizes to one of the fixed columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
#[value(rename_all = "kebab-case")]
pub enum FixedColumnPolicy {
    /// Discard the column's data for this upload.
    #[default]
    Drop,
    /// Keep the data under `<name>_data`.
    Rename,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub busy_timeout_ms: u64,
    pub missing_markers: Vec<String>,
    pub header_collisions: HeaderCollisionPolicy,
    pub fixed_column_collisions: FixedColumnPolicy,
    /// Worksheet to read; the first sheet when unset.
    pub sheet: Option<String>,
    /// Delimiter override for delimited text uploads.
    pub delimiter: Option<char>,
    /// Encoding label for delimited text uploads (defaults to utf-8).
    pub encoding: Option<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            missing_markers: DEFAULT_MISSING_MARKERS
                .iter()
                .map(|marker| marker.to_string())
                .collect(),
            header_collisions: HeaderCollisionPolicy::default(),
            fixed_column_collisions: FixedColumnPolicy::default(),
            sheet: None,
            delimiter: None,
            encoding: None,
        }
    }
}

impl IngestConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let mut raw = String::new();
        File::open(path)
            .and_then(|file| BufReader::new(file).read_to_string(&mut raw))
            .with_context(|| format!("Reading config file {path:?}"))?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&raw).with_context(|| format!("Parsing config file {path:?}"))
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating config file {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing config YAML")
    }

    pub fn is_missing(&self, value: &str) -> bool {
        self.missing_markers.iter().any(|marker| marker == value)
    }

    /// Delimiter byte for delimited uploads, when one was configured.
    pub fn delimiter_byte(&self) -> Option<u8> {
        self.delimiter.filter(char::is_ascii).map(|ch| ch as u8)
    }
}
