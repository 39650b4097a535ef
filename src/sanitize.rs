//! Identifier sanitizing for dynamically created tables and columns.
//!
//! Project names and spreadsheet headers are free-form user text. Before any
//! of them reaches a SQL statement they pass through [`sanitize_column`] or
//! [`sanitize_table`], which map every input to an ASCII identifier matching
//! `[A-Za-z_][0-9A-Za-z_]*`. Both functions are total and idempotent, so the
//! same header keeps landing in the same column across uploads.
//!
//! [`Identifier`] can only be built by these functions, which lets the store
//! layer splice it into DDL without any further escaping.

use std::fmt;

use serde::Serialize;

/// Substituted when nothing survives sanitizing a column header.
pub const COLUMN_PLACEHOLDER: &str = "col";
/// Substituted when nothing survives sanitizing a project name.
pub const TABLE_PLACEHOLDER: &str = "tbl";

const COLUMN_DIGIT_PREFIX: &str = "c_";
const TABLE_DIGIT_PREFIX: &str = "t_";

/// Table names the store or the project registry already own.
const RESERVED_TABLES: &[&str] = &["projects"];
const RESERVED_TABLE_PREFIX: &str = "sqlite_";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Identifier(String);

impl Identifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Double-quoted form for use in SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }

    /// Case-folded key used for "already exists" comparisons.
    pub fn folded(&self) -> String {
        self.0.to_ascii_lowercase()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Identifier {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Identifier {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Sanitizes a spreadsheet header into a column identifier. Case is kept.
pub fn sanitize_column(raw: &str) -> Identifier {
    Identifier(base_identifier(raw, COLUMN_PLACEHOLDER, COLUMN_DIGIT_PREFIX))
}

/// Sanitizes a project name into a lower-cased table identifier.
pub fn sanitize_table(raw: &str) -> Identifier {
    let mut name = base_identifier(raw, TABLE_PLACEHOLDER, TABLE_DIGIT_PREFIX).to_ascii_lowercase();
    if RESERVED_TABLES.contains(&name.as_str()) || name.starts_with(RESERVED_TABLE_PREFIX) {
        name.insert_str(0, TABLE_DIGIT_PREFIX);
    }
    Identifier(name)
}

fn base_identifier(raw: &str, placeholder: &str, digit_prefix: &str) -> String {
    let mut name: String = raw
        .trim()
        .chars()
        .map(|ch| if ch == ' ' || ch == '-' { '_' } else { ch })
        .filter(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .collect();
    if name.is_empty() {
        name.push_str(placeholder);
    }
    if name.starts_with(|ch: char| ch.is_ascii_digit()) {
        name.insert_str(0, digit_prefix);
    }
    name
}
