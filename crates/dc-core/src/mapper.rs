//! Column correspondence between the two sources
//!
//! Columns are paired in two passes:
//! - case-insensitive exact name matches, in source-1 column order
//! - for whatever is left, the most similar unused source-2 column, accepted
//!   only when the similarity is strictly above [`SIMILARITY_THRESHOLD`]
//!
//! Similarity is a matching-blocks ratio: `2 * M / (len(a) + len(b))`, where
//! `M` is the number of characters covered by recursively taking the longest
//! common contiguous run and repeating on the pieces to its left and right.

use crate::error::{Error, MappingViolation, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Minimum (exclusive) similarity for a fuzzy column match
pub const SIMILARITY_THRESHOLD: f64 = 0.6;

/// Ordered mapping from source-1 column names to source-2 column names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnMapping {
    entries: Vec<(String, String)>,
}

impl ColumnMapping {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `source` to `target`, replacing any existing target for `source`
    pub fn insert(&mut self, source: impl Into<String>, target: impl Into<String>) {
        let source = source.into();
        let target = target.into();
        match self.entries.iter_mut().find(|(s, _)| *s == source) {
            Some(entry) => entry.1 = target,
            None => self.entries.push((source, target)),
        }
    }

    /// Target column for a source-1 column
    pub fn get(&self, source: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, t)| t.as_str())
    }

    /// Whether a source-1 column is mapped
    pub fn contains(&self, source: &str) -> bool {
        self.get(source).is_some()
    }

    /// Iterate `(source, target)` pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(s, t)| (s.as_str(), t.as_str()))
    }

    /// Mapped source-1 columns in insertion order
    pub fn source_columns(&self) -> Vec<String> {
        self.entries.iter().map(|(s, _)| s.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: Into<String>, T: Into<String>> FromIterator<(S, T)> for ColumnMapping {
    fn from_iter<I: IntoIterator<Item = (S, T)>>(iter: I) -> Self {
        let mut mapping = ColumnMapping::new();
        for (s, t) in iter {
            mapping.insert(s, t);
        }
        mapping
    }
}

impl Serialize for ColumnMapping {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (source, target) in &self.entries {
            map.serialize_entry(source, target)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ColumnMapping {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct MappingVisitor;

        impl<'de> Visitor<'de> for MappingVisitor {
            type Value = ColumnMapping;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an object of source column name to target column name")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Self::Value, A::Error> {
                let mut mapping = ColumnMapping::new();
                while let Some((source, target)) = access.next_entry::<String, String>()? {
                    mapping.insert(source, target);
                }
                Ok(mapping)
            }
        }

        deserializer.deserialize_map(MappingVisitor)
    }
}

/// Contents of a mapping configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Path of the first data source
    pub source1: String,
    /// Path of the second data source
    pub source2: String,
    /// Source-1 column name to source-2 column name
    pub column_mapping: ColumnMapping,
}

/// Load a mapping configuration from JSON
pub fn load_mapping_config<P: AsRef<Path>>(path: P) -> Result<MappingConfig> {
    let path = path.as_ref();
    let config_error = |message: String| Error::Config {
        path: path.to_path_buf(),
        message,
    };

    if !path.exists() {
        return Err(config_error("file not found".to_string()));
    }
    let content = fs::read_to_string(path).map_err(|e| config_error(e.to_string()))?;
    serde_json::from_str(&content).map_err(|e| config_error(e.to_string()))
}

/// Automatically pair columns of source 1 with columns of source 2
pub fn auto_map<A: AsRef<str>, B: AsRef<str>>(columns_a: &[A], columns_b: &[B]) -> ColumnMapping {
    let lower_b: Vec<String> = columns_b.iter().map(|c| c.as_ref().to_lowercase()).collect();
    let mut used_b = vec![false; columns_b.len()];
    let mut matched: Vec<Option<usize>> = vec![None; columns_a.len()];

    // Exact, case-insensitive
    for (ia, col_a) in columns_a.iter().enumerate() {
        let lower_a = col_a.as_ref().to_lowercase();
        if let Some(ib) = (0..columns_b.len()).find(|&ib| !used_b[ib] && lower_b[ib] == lower_a) {
            used_b[ib] = true;
            matched[ia] = Some(ib);
        }
    }

    // Best remaining candidate by similarity
    for (ia, col_a) in columns_a.iter().enumerate() {
        if matched[ia].is_some() {
            continue;
        }
        let mut best: Option<(usize, f64)> = None;
        for (ib, col_b) in columns_b.iter().enumerate() {
            if used_b[ib] {
                continue;
            }
            let score = similarity(col_a.as_ref(), col_b.as_ref());
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((ib, score));
            }
        }
        if let Some((ib, score)) = best {
            if score > SIMILARITY_THRESHOLD {
                debug!(
                    source = col_a.as_ref(),
                    target = columns_b[ib].as_ref(),
                    score,
                    "similarity match"
                );
                used_b[ib] = true;
                matched[ia] = Some(ib);
            }
        }
    }

    columns_a
        .iter()
        .zip(matched)
        .filter_map(|(a, ib)| ib.map(|ib| (a.as_ref(), columns_b[ib].as_ref())))
        .collect()
}

/// Check that every mapped column exists on its side. All violations are
/// reported together.
pub fn validate_mapping<A: AsRef<str>, B: AsRef<str>>(
    mapping: &ColumnMapping,
    columns_a: &[A],
    columns_b: &[B],
) -> Result<()> {
    let mut violations = Vec::new();
    for (source, _) in mapping.iter() {
        if !columns_a.iter().any(|c| c.as_ref() == source) {
            violations.push(MappingViolation::UnknownSourceColumn(source.to_string()));
        }
    }
    for (_, target) in mapping.iter() {
        if !columns_b.iter().any(|c| c.as_ref() == target) {
            violations.push(MappingViolation::UnknownTargetColumn(target.to_string()));
        }
    }

    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::Mapping(violations))
    }
}

/// Case-insensitive matching-blocks similarity in `[0, 1]`.
///
/// The block decomposition is not symmetric for every input, so the larger
/// of the two directions is used.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.to_lowercase().chars().collect();
    let b: Vec<char> = b.to_lowercase().chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matching_chars(&a, &b).max(matching_chars(&b, &a));
    2.0 * matched as f64 / total as f64
}

fn matching_chars(a: &[char], b: &[char]) -> usize {
    let (i, j, len) = longest_common_run(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_chars(&a[..i], &b[..j]) + matching_chars(&a[i + len..], &b[j + len..])
}

/// Longest common contiguous run as `(start_a, start_b, len)`; ties resolve
/// to the earliest start in `a`, then in `b`.
fn longest_common_run(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best = (0, 0, 0);
    let mut prev = vec![0usize; b.len() + 1];
    for i in 0..a.len() {
        let mut cur = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                cur[j + 1] = prev[j] + 1;
                if cur[j + 1] > best.2 {
                    best = (i + 1 - cur[j + 1], j + 1 - cur[j + 1], cur[j + 1]);
                }
            }
        }
        prev = cur;
    }
    best
}
