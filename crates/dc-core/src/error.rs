//! Error types for dc-core

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in dc-core
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to read a file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse CSV
    #[error("failed to parse CSV '{path}': {message}")]
    CsvParse { path: PathBuf, message: String },

    /// CSV parsing error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// A JSONL line that is not a JSON object
    #[error("invalid JSONL in '{path}' at line {line}: {message}")]
    JsonlParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Neither the extension nor the content identifies the format
    #[error("unable to determine format of '{0}'")]
    UnknownFormat(PathBuf),

    /// Missing or malformed mapping configuration file
    #[error("invalid mapping config '{path}': {message}")]
    Config { path: PathBuf, message: String },

    /// Column mapping references unknown columns
    #[error("invalid column mapping:{}", bullet_list(.0))]
    Mapping(Vec<MappingViolation>),

    /// Identifier columns are unusable
    #[error("invalid ID columns:{}", bullet_list(.0))]
    IdColumns(Vec<IdViolation>),

    /// Comparison requested over columns that cannot be resolved
    #[error("invalid comparison configuration:{}", bullet_list(.0))]
    Configuration(Vec<String>),

    /// Duplicate keys found while the fail-closed policy is active
    #[error("duplicate keys found:{}", bullet_list(.0))]
    DuplicateKeys(Vec<String>),

    /// Failed to write CSV output
    #[error("CSV write error: {0}")]
    CsvWrite(#[from] csv::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A single problem found while validating a column mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingViolation {
    /// Mapping key is not a column of source 1
    UnknownSourceColumn(String),
    /// Mapping value is not a column of source 2
    UnknownTargetColumn(String),
}

impl fmt::Display for MappingViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownSourceColumn(col) => write!(f, "source column '{col}' not found in source1"),
            Self::UnknownTargetColumn(col) => write!(f, "target column '{col}' not found in source2"),
        }
    }
}

/// A single problem found while validating identifier columns
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdViolation {
    /// The column does not exist in the data source
    NotFound(String),
    /// At least one sampled record has no value in the column
    NullValue(String),
}

impl IdViolation {
    /// Whether the violation makes the key unusable.
    ///
    /// Null key values still join (null is a distinct key part), so only a
    /// missing column is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Column the violation refers to
    pub fn column(&self) -> &str {
        match self {
            Self::NotFound(col) | Self::NullValue(col) => col,
        }
    }
}

impl fmt::Display for IdViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(col) => write!(f, "ID column '{col}' not found in data source"),
            Self::NullValue(col) => write!(f, "ID column '{col}' contains null values"),
        }
    }
}

fn bullet_list<T: fmt::Display>(items: &[T]) -> String {
    items.iter().map(|item| format!("\n  - {item}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_error_lists_every_violation() {
        let err = Error::Mapping(vec![
            MappingViolation::UnknownSourceColumn("a".to_string()),
            MappingViolation::UnknownTargetColumn("b".to_string()),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("source column 'a' not found in source1"));
        assert!(msg.contains("target column 'b' not found in source2"));
        assert_eq!(msg.lines().count(), 3);
    }

    #[test]
    fn test_id_violation_fatality() {
        assert!(IdViolation::NotFound("id".to_string()).is_fatal());
        assert!(!IdViolation::NullValue("id".to_string()).is_fatal());
        assert_eq!(IdViolation::NullValue("id".to_string()).column(), "id");
    }
}
