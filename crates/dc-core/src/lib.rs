//! dc-core: Core library for reconciling two tabular data sources
//!
//! This library provides functionality to:
//! - Read CSV and JSONL files into tables
//! - Map columns between two sources, explicitly or by name similarity
//! - Detect and validate identifier columns, and report duplicate keys
//! - Compare two tables by key, reporting rows unique to either side,
//!   differing values, and per-column match rates
//! - Render comparison results as console text, JSON, or CSV

pub mod engine;
pub mod error;
pub mod identifier;
pub mod mapper;
pub mod parser;
pub mod report;
pub mod table;

pub use engine::{compare, CellChange, ColumnStat, CompareOptions, ComparisonResult, DuplicatePolicy, RowDiff};
pub use error::{Error, IdViolation, MappingViolation, Result};
pub use identifier::{detect_id_columns, find_duplicates, validate_id_columns, DuplicateKey};
pub use mapper::{auto_map, load_mapping_config, similarity, validate_mapping, ColumnMapping, MappingConfig};
pub use parser::{detect_format, parse_csv_str, parse_jsonl_str, read_source, SourceFormat};
pub use report::{render_console, render_json, wrap_text, write_csv, Summary};
pub use table::{CellValue, Column, Record, Row, Table};
