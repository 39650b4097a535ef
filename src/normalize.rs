//! Header and cell normalization for one upload.
//!
//! Turns a [`RawSheet`] into rows keyed by sanitized column identifiers:
//!
//! 1. Each header is trimmed and sanitized. Headers landing on a fixed
//!    column are dropped or renamed according to [`FixedColumnPolicy`].
//! 2. Headers that fold to the same identifier share one slot; the later
//!    header's cell overwrites the earlier one in every row. Such collisions
//!    are reported so the caller can reject the upload instead.
//! 3. Cells equal to a configured missing marker become `None`.
//! 4. Rows with no value left are dropped, then columns with no value left.
//!
//! Normalization is total: every sheet produces a (possibly empty) result.

use std::collections::HashMap;

use log::warn;

use crate::{
    config::{FixedColumnPolicy, IngestConfig},
    decode::RawSheet,
    sanitize::{Identifier, sanitize_column},
    store,
};

const FIXED_RENAME_SUFFIX: &str = "_data";

/// Two headers of one file that map to the same column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderCollision {
    pub column: Identifier,
    pub kept: String,
    pub overwritten: String,
}

#[derive(Debug, Clone, Default)]
pub struct NormalizedUpload {
    /// Data columns carrying at least one value, in first-seen order.
    pub columns: Vec<Identifier>,
    /// Surviving rows, each aligned with `columns`.
    pub rows: Vec<Vec<Option<String>>>,
    /// Headers discarded because they named a fixed column.
    pub dropped_headers: Vec<String>,
    /// Columns removed because every cell was missing.
    pub empty_columns: Vec<Identifier>,
    pub empty_rows: usize,
    pub collisions: Vec<HeaderCollision>,
}

impl NormalizedUpload {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Where a source column's cells go.
struct HeaderPlan {
    /// Slot per source column; `None` for dropped headers.
    targets: Vec<Option<usize>>,
    columns: Vec<Identifier>,
    dropped_headers: Vec<String>,
    collisions: Vec<HeaderCollision>,
}

fn plan_headers(headers: &[String], policy: FixedColumnPolicy) -> HeaderPlan {
    let mut slots: HashMap<String, usize> = HashMap::new();
    let mut owners: Vec<String> = Vec::new();
    let mut plan = HeaderPlan {
        targets: Vec::with_capacity(headers.len()),
        columns: Vec::new(),
        dropped_headers: Vec::new(),
        collisions: Vec::new(),
    };

    for raw in headers {
        let trimmed = raw.trim();
        let mut column = sanitize_column(trimmed);
        if store::is_fixed_column(column.as_str()) {
            match policy {
                FixedColumnPolicy::Drop => {
                    warn!("Dropping header '{trimmed}': it collides with fixed column '{column}'");
                    plan.dropped_headers.push(trimmed.to_string());
                    plan.targets.push(None);
                    continue;
                }
                FixedColumnPolicy::Rename => {
                    let renamed = sanitize_column(&format!("{column}{FIXED_RENAME_SUFFIX}"));
                    warn!("Header '{trimmed}' collides with fixed column '{column}'; storing as '{renamed}'");
                    column = renamed;
                }
            }
        }

        let slot = match slots.get(&column.folded()) {
            Some(&slot) => {
                warn!(
                    "Headers '{}' and '{trimmed}' both map to column '{}'; keeping '{trimmed}'",
                    owners[slot], plan.columns[slot]
                );
                plan.collisions.push(HeaderCollision {
                    column: plan.columns[slot].clone(),
                    kept: trimmed.to_string(),
                    overwritten: std::mem::replace(&mut owners[slot], trimmed.to_string()),
                });
                slot
            }
            None => {
                let slot = plan.columns.len();
                slots.insert(column.folded(), slot);
                owners.push(trimmed.to_string());
                plan.columns.push(column);
                slot
            }
        };
        plan.targets.push(Some(slot));
    }
    plan
}

pub fn normalize(sheet: &RawSheet, config: &IngestConfig) -> NormalizedUpload {
    let plan = plan_headers(&sheet.headers, config.fixed_column_collisions);
    let width = plan.columns.len();

    let mut empty_rows = 0usize;
    let mut rows = Vec::with_capacity(sheet.rows.len());
    for raw in &sheet.rows {
        let mut row: Vec<Option<String>> = vec![None; width];
        for (cell, target) in raw.iter().zip(&plan.targets) {
            let Some(slot) = *target else {
                continue;
            };
            row[slot] = cell.as_ref().filter(|value| !config.is_missing(value)).cloned();
        }
        if row.iter().all(Option::is_none) {
            empty_rows += 1;
        } else {
            rows.push(row);
        }
    }

    let keep: Vec<bool> = (0..width)
        .map(|idx| rows.iter().any(|row| row[idx].is_some()))
        .collect();
    let mut columns = Vec::with_capacity(width);
    let mut empty_columns = Vec::new();
    for (column, kept) in plan.columns.into_iter().zip(&keep) {
        if *kept {
            columns.push(column);
        } else {
            empty_columns.push(column);
        }
    }
    if !empty_columns.is_empty() {
        for row in &mut rows {
            let mut flags = keep.iter();
            row.retain(|_| flags.next().copied().unwrap_or(false));
        }
    }

    NormalizedUpload {
        columns,
        rows,
        dropped_headers: plan.dropped_headers,
        empty_columns,
        empty_rows,
        collisions: plan.collisions,
    }
}
