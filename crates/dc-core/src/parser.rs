//! Source readers for CSV and JSONL data files

use crate::error::{Error, Result};
use crate::table::{CellValue, Column, Row, Table};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Physical format of a data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Jsonl,
}

/// Detect whether a file is CSV or JSONL.
///
/// The extension decides first; otherwise the first non-empty line is
/// sniffed: a JSON object means JSONL, a comma means CSV.
pub fn detect_format<P: AsRef<Path>>(path: P) -> Result<SourceFormat> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("csv") => return Ok(SourceFormat::Csv),
        Some("jsonl") | Some("ndjson") => return Ok(SourceFormat::Jsonl),
        _ => {}
    }

    let mut first_line = String::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if !line.trim().is_empty() {
            first_line = line;
            break;
        }
    }
    let first_line = first_line.trim();

    if serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(first_line).is_ok() {
        return Ok(SourceFormat::Jsonl);
    }
    if first_line.contains(',') {
        return Ok(SourceFormat::Csv);
    }
    Err(Error::UnknownFormat(path.to_path_buf()))
}

/// Read a data source, detecting its format
pub fn read_source<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Table> {
    let path = path.as_ref();
    let format = detect_format(path)?;
    debug!(path = %path.display(), ?format, "reading source");
    match format {
        SourceFormat::Csv => parse_csv(path, delimiter),
        SourceFormat::Jsonl => parse_jsonl(path),
    }
}

/// Parse a CSV file into a Table
pub fn parse_csv<P: AsRef<Path>>(path: P, delimiter: u8) -> Result<Table> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    read_csv(BufReader::new(file), path.to_path_buf(), delimiter)
}

/// Parse CSV from a string (useful for testing)
pub fn parse_csv_str(content: &str, source_name: &str, delimiter: u8) -> Result<Table> {
    read_csv(content.as_bytes(), PathBuf::from(source_name), delimiter)
}

fn read_csv<R: Read>(reader: R, path: PathBuf, delimiter: u8) -> Result<Table> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true) // Allow varying number of fields
        .from_reader(reader);

    // Parse headers into columns
    let headers = csv_reader.headers().map_err(|e| Error::Csv {
        path: path.clone(),
        source: e,
    })?;

    let columns: Vec<Column> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| Column::new(name.to_string(), i))
        .collect();

    if columns.is_empty() {
        return Err(Error::CsvParse {
            path,
            message: "no columns found in CSV".to_string(),
        });
    }

    let mut rows = Vec::new();
    for (row_idx, result) in csv_reader.records().enumerate() {
        let record = result.map_err(|e| Error::Csv {
            path: path.clone(),
            source: e,
        })?;

        let mut cells: Vec<CellValue> = record.iter().map(CellValue::from_field).collect();

        if cells.len() > columns.len() {
            warn!(
                row = row_idx + 1,
                path = %path.display(),
                "row has more cells than columns, truncating"
            );
        }
        cells.resize(columns.len(), CellValue::Empty);

        rows.push(Row::new(cells));
    }

    debug!(rows = rows.len(), columns = columns.len(), path = %path.display(), "parsed CSV");
    Ok(Table {
        columns,
        rows,
        source_path: path,
    })
}

/// Parse a JSONL file into a Table
pub fn parse_jsonl<P: AsRef<Path>>(path: P) -> Result<Table> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| Error::FileRead {
        path: path.to_path_buf(),
        source: e,
    })?;
    read_jsonl(&content, path.to_path_buf())
}

/// Parse JSONL from a string (useful for testing)
pub fn parse_jsonl_str(content: &str, source_name: &str) -> Result<Table> {
    read_jsonl(content, PathBuf::from(source_name))
}

fn read_jsonl(content: &str, path: PathBuf) -> Result<Table> {
    let mut columns: Vec<Column> = Vec::new();
    let mut col_index: HashMap<String, usize> = HashMap::new();
    let mut objects = Vec::new();

    for (line_idx, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let object: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(line).map_err(|e| Error::JsonlParse {
                path: path.clone(),
                line: line_idx + 1,
                message: e.to_string(),
            })?;

        // Column set is the union of keys in first-seen order
        for key in object.keys() {
            if !col_index.contains_key(key) {
                col_index.insert(key.clone(), columns.len());
                columns.push(Column::new(key.clone(), columns.len()));
            }
        }
        objects.push(object);
    }

    let rows = objects
        .iter()
        .map(|object| {
            let mut cells = vec![CellValue::Empty; columns.len()];
            for (key, value) in object {
                if let Some(&idx) = col_index.get(key) {
                    cells[idx] = CellValue::from_json(value);
                }
            }
            Row::new(cells)
        })
        .collect::<Vec<_>>();

    debug!(rows = rows.len(), columns = columns.len(), path = %path.display(), "parsed JSONL");
    Ok(Table {
        columns,
        rows,
        source_path: path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_csv() {
        let csv = "id,name,value\n1,foo,100\n2,bar,200\n";
        let table = parse_csv_str(csv, "test.csv", b',').unwrap();

        assert_eq!(table.column_names(), vec!["id", "name", "value"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(
            table.value(1, "name"),
            Some(&CellValue::String("bar".to_string()))
        );
    }

    #[test]
    fn test_parse_with_empty_cells() {
        let csv = "id,name,value\n1,,100\n2,bar,\n";
        let table = parse_csv_str(csv, "test.csv", b',').unwrap();

        assert_eq!(table.rows[0].cells[1], CellValue::Empty);
        assert_eq!(table.rows[1].cells[2], CellValue::Empty);
    }

    #[test]
    fn test_parse_custom_delimiter() {
        let csv = "id;name;value\n1;test;100\n";
        let table = parse_csv_str(csv, "test.csv", b';').unwrap();

        assert_eq!(table.column_count(), 3);
        assert_eq!(
            table.value(0, "name"),
            Some(&CellValue::String("test".to_string()))
        );
    }

    #[test]
    fn test_parse_ragged_rows() {
        let csv = "id,name\n1\n2,bar,extra\n";
        let table = parse_csv_str(csv, "test.csv", b',').unwrap();

        assert_eq!(table.rows[0].cells, vec![CellValue::String("1".into()), CellValue::Empty]);
        assert_eq!(table.rows[1].cells.len(), 2);
    }

    #[test]
    fn test_parse_jsonl_union_of_keys() {
        let jsonl = "{\"id\": 1, \"name\": \"test\"}\n\n{\"id\": 2, \"value\": 200}\n";
        let table = parse_jsonl_str(jsonl, "test.jsonl").unwrap();

        assert_eq!(table.column_names(), vec!["id", "name", "value"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.value(0, "value"), Some(&CellValue::Empty));
        assert_eq!(table.value(1, "value"), Some(&CellValue::Number(200.into())));
    }

    #[test]
    fn test_parse_jsonl_reports_line() {
        let jsonl = "{\"id\": 1}\n[1, 2]\n";
        let err = parse_jsonl_str(jsonl, "bad.jsonl").unwrap_err();
        assert!(matches!(err, Error::JsonlParse { line: 2, .. }));
    }
}
