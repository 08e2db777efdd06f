//! Core table types for representing a loaded data source

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::borrow::Cow;
use std::path::PathBuf;

/// A fully loaded data source (one record batch)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Column definitions
    pub columns: Vec<Column>,
    /// Row data, one cell per column
    pub rows: Vec<Row>,
    /// Source file path
    pub source_path: PathBuf,
}

impl Table {
    /// Build a table from column names and rows (useful for testing)
    pub fn from_rows<S: AsRef<str>>(
        source_path: impl Into<PathBuf>,
        column_names: &[S],
        rows: Vec<Vec<CellValue>>,
    ) -> Self {
        let columns = column_names
            .iter()
            .enumerate()
            .map(|(i, name)| Column::new(name.as_ref().to_string(), i))
            .collect::<Vec<_>>();
        let rows = rows
            .into_iter()
            .map(|mut cells| {
                cells.resize(columns.len(), CellValue::Empty);
                Row::new(cells)
            })
            .collect();
        Self {
            columns,
            rows,
            source_path: source_path.into(),
        }
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Column names in source order
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Find a column by name
    pub fn find_column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Index of a column by name
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.find_column(name).map(|c| c.index)
    }

    /// Get a cell by row index and column name
    pub fn value(&self, row_idx: usize, column: &str) -> Option<&CellValue> {
        let col = self.column_index(column)?;
        self.rows.get(row_idx).and_then(|r| r.get(col))
    }

    /// Materialise a row as a name-ordered record
    pub fn record(&self, row_idx: usize) -> Record {
        let fields = match self.rows.get(row_idx) {
            Some(row) => self
                .columns
                .iter()
                .map(|c| {
                    let value = row.get(c.index).cloned().unwrap_or(CellValue::Empty);
                    (c.name.clone(), value)
                })
                .collect(),
            None => Vec::new(),
        };
        Record { fields }
    }

    /// A copy of this table limited to its first `n` rows
    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self.columns.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
            source_path: self.source_path.clone(),
        }
    }
}

/// A column definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name as it appears in the header
    pub name: String,
    /// Column index (0-based)
    pub index: usize,
}

impl Column {
    /// Create a new column
    pub fn new(name: String, index: usize) -> Self {
        Self { name, index }
    }
}

/// A row of data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    /// Cell values for each column
    pub cells: Vec<CellValue>,
}

impl Row {
    /// Create a new row
    pub fn new(cells: Vec<CellValue>) -> Self {
        Self { cells }
    }

    /// Get a cell value by column index
    pub fn get(&self, index: usize) -> Option<&CellValue> {
        self.cells.get(index)
    }
}

/// A scalar cell value. Comparison only ever looks at its text rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    /// JSON number, held exactly as decoded so that large integers and
    /// float text such as `100.0` survive
    Number(serde_json::Number),
    /// Boolean value
    Bool(bool),
    /// String value, kept verbatim
    String(String),
    /// Absent/null cell
    Empty,
}

impl CellValue {
    /// Build a value from a raw CSV field. Empty fields are null; anything
    /// else is kept as-is, including surrounding whitespace.
    pub fn from_field(s: &str) -> Self {
        if s.is_empty() {
            CellValue::Empty
        } else {
            CellValue::String(s.to_string())
        }
    }

    /// Build a value from a decoded JSON value
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => CellValue::Empty,
            Value::Bool(b) => CellValue::Bool(*b),
            Value::Number(n) => CellValue::Number(n.clone()),
            Value::String(s) => CellValue::String(s.clone()),
            nested => CellValue::String(nested.to_string()),
        }
    }

    /// Check if the cell is absent/null
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    /// Text rendering used for comparison; `None` for null
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            CellValue::Number(n) => Some(Cow::Owned(n.to_string())),
            CellValue::Bool(b) => Some(Cow::Borrowed(if *b { "true" } else { "false" })),
            CellValue::String(s) => Some(Cow::Borrowed(s)),
            CellValue::Empty => None,
        }
    }

    /// Convert to a display string
    pub fn to_string_value(&self) -> String {
        self.as_text().map(Cow::into_owned).unwrap_or_default()
    }
}

impl std::fmt::Display for CellValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_text() {
            Some(text) => write!(f, "{}", text),
            None => Ok(()),
        }
    }
}

/// A single row materialised as column name/value pairs in column order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub fields: Vec<(String, CellValue)>,
}

impl Record {
    /// Get a value by column name
    pub fn get(&self, column: &str) -> Option<&CellValue> {
        self.fields.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    /// Compact `col=value` rendering, e.g. `id=4, region=EU`
    pub fn describe(&self) -> String {
        self.fields
            .iter()
            .map(|(c, v)| format!("{c}={v}"))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// Serialised as a JSON object so that reports keep the source column order.
impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (column, value) in &self.fields {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}
