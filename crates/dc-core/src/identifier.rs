//! Detection and validation of identifier (key) columns

use crate::error::IdViolation;
use crate::table::{CellValue, Table};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Uniqueness ratio a column must exceed to be considered an identifier
pub const UNIQUENESS_THRESHOLD: f64 = 0.95;

/// Normalised value of one key column; `None` for null
pub type KeyPart = Option<String>;

/// Composite key: one normalised part per identifier column
pub type KeyValue = Vec<KeyPart>;

/// A composite key that occurs more than once in a sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateKey {
    /// Key column name to value, in key column order
    pub key_values: Vec<(String, KeyPart)>,
    /// Number of sampled records carrying this key
    pub count: usize,
}

impl DuplicateKey {
    /// Compact `col=value` rendering
    pub fn describe(&self) -> String {
        self.key_values
            .iter()
            .map(|(c, v)| format!("{}={}", c, v.as_deref().unwrap_or("null")))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

pub(crate) fn key_part(value: Option<&CellValue>) -> KeyPart {
    value.and_then(|v| v.as_text()).map(|t| t.into_owned())
}

/// Build the composite key of a row from resolved column indices
pub(crate) fn composite_key(table: &Table, row_idx: usize, key_indices: &[Option<usize>]) -> KeyValue {
    let row = &table.rows[row_idx];
    key_indices
        .iter()
        .map(|idx| key_part(idx.and_then(|i| row.get(i))))
        .collect()
}

/// Whether a column name looks like an identifier
pub fn matches_id_pattern(column: &str) -> bool {
    let name = column.to_lowercase();
    name == "id" || name.ends_with("_id") || name.ends_with("id") || name == "key" || name.ends_with("_key")
}

/// Candidate identifier columns, in column order.
///
/// A column qualifies by name ([`matches_id_pattern`]) or by having more
/// than 95% distinct values across the sample.
pub fn detect_id_columns(sample: &Table) -> Vec<String> {
    let total = sample.row_count();
    let candidates: Vec<String> = sample
        .columns
        .iter()
        .filter(|col| {
            if matches_id_pattern(&col.name) {
                return true;
            }
            if total == 0 {
                return false;
            }
            let distinct: HashSet<KeyPart> = sample
                .rows
                .iter()
                .map(|row| key_part(row.get(col.index)))
                .collect();
            distinct.len() as f64 / total as f64 > UNIQUENESS_THRESHOLD
        })
        .map(|col| col.name.clone())
        .collect();

    debug!(?candidates, sample_size = total, "detected ID columns");
    candidates
}

/// Validate identifier columns against a sample. Every violation is
/// returned; an empty vector means the key is usable.
pub fn validate_id_columns<S: AsRef<str>>(key_columns: &[S], sample: &Table) -> Vec<IdViolation> {
    let mut violations = Vec::new();
    for col in key_columns {
        let col = col.as_ref();
        match sample.column_index(col) {
            None => violations.push(IdViolation::NotFound(col.to_string())),
            Some(idx) => {
                let has_null = sample
                    .rows
                    .iter()
                    .any(|row| row.get(idx).map_or(true, CellValue::is_empty));
                if has_null {
                    violations.push(IdViolation::NullValue(col.to_string()));
                }
            }
        }
    }
    violations
}

/// Composite keys occurring more than once, in order of first appearance
pub fn find_duplicates<S: AsRef<str>>(key_columns: &[S], sample: &Table) -> Vec<DuplicateKey> {
    let indices: Vec<Option<usize>> = key_columns
        .iter()
        .map(|c| sample.column_index(c.as_ref()))
        .collect();

    let mut order: Vec<KeyValue> = Vec::new();
    let mut counts: HashMap<KeyValue, usize> = HashMap::new();
    for row_idx in 0..sample.row_count() {
        let key = composite_key(sample, row_idx, &indices);
        let count = counts.entry(key.clone()).or_insert(0);
        if *count == 0 {
            order.push(key);
        }
        *count += 1;
    }

    order
        .into_iter()
        .filter_map(|key| {
            let count = counts[&key];
            (count > 1).then(|| DuplicateKey {
                key_values: key_columns
                    .iter()
                    .map(|c| c.as_ref().to_string())
                    .zip(key)
                    .collect(),
                count,
            })
        })
        .collect()
}
