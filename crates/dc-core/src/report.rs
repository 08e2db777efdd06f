//! Rendering of comparison results as console text, JSON, or CSV tables

use crate::engine::ComparisonResult;
use crate::error::Result;
use crate::table::{CellValue, Record};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt::Write as _;
use std::io::Write;

/// Width of each value column in the detailed console diff
const VALUE_WIDTH: usize = 30;

/// Row counts of a comparison
#[derive(Debug, Clone, Serialize)]
pub struct RowCounts {
    pub unique_to_source1: usize,
    pub unique_to_source2: usize,
    pub differences: usize,
    pub matched: usize,
}

/// Match and difference percentages for one column
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSummary {
    pub column: String,
    pub match_percentage: String,
    pub difference_percentage: String,
}

/// Headline numbers of a comparison
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub generated_at: DateTime<Utc>,
    pub key_columns: Vec<String>,
    pub row_counts: RowCounts,
    pub column_statistics: Vec<ColumnSummary>,
}

impl Summary {
    pub fn from_result(result: &ComparisonResult) -> Self {
        Self {
            generated_at: Utc::now(),
            key_columns: result.key_columns.clone(),
            row_counts: RowCounts {
                unique_to_source1: result.only_in_a.len(),
                unique_to_source2: result.only_in_b.len(),
                differences: result.differing.len(),
                matched: result.matched_rows(),
            },
            column_statistics: result
                .column_stats
                .iter()
                .map(|stat| ColumnSummary {
                    column: stat.column.clone(),
                    match_percentage: percentage(stat.match_ratio),
                    difference_percentage: percentage(1.0 - stat.match_ratio),
                })
                .collect(),
        }
    }
}

fn percentage(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// Human-readable report; `show_diff` adds the row-level details
pub fn render_console(result: &ComparisonResult, show_diff: bool) -> String {
    let summary = Summary::from_result(result);
    let counts = &summary.row_counts;
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "=== Comparison Summary ===");
    let _ = writeln!(out);
    let _ = writeln!(out, "Row Counts:");
    let _ = writeln!(out, "  Unique to source 1: {}", counts.unique_to_source1);
    let _ = writeln!(out, "  Unique to source 2: {}", counts.unique_to_source2);
    let _ = writeln!(out, "  Rows with differences: {}", counts.differences);
    let _ = writeln!(out, "  Matching rows: {}", counts.matched);
    let _ = writeln!(out);
    let _ = writeln!(out, "Column Statistics:");
    if summary.column_statistics.is_empty() {
        let _ = writeln!(out, "  (no common rows)");
    }
    for stat in &summary.column_statistics {
        let _ = writeln!(out, "  {}:", stat.column);
        let _ = writeln!(out, "    Match: {}", stat.match_percentage);
        let _ = writeln!(out, "    Diff:  {}", stat.difference_percentage);
    }

    if show_diff {
        let _ = writeln!(out);
        let _ = writeln!(out, "=== Detailed Differences ===");
        render_records(&mut out, "Removed (only in source 1)", '-', &result.only_in_a);
        render_records(&mut out, "Added (only in source 2)", '+', &result.only_in_b);

        let _ = writeln!(out);
        let _ = writeln!(out, "Modified: {}", result.differing.len());
        for diff in &result.differing {
            let _ = writeln!(out);
            let _ = writeln!(out, "  ID: {}", diff.key.describe());
            let _ = writeln!(
                out,
                "    {:<20} {:<w$} {:<w$}",
                "Column",
                "Source 1",
                "Source 2",
                w = VALUE_WIDTH
            );
            for change in &diff.changes {
                let left = wrap_text(&display_value(&change.source1), VALUE_WIDTH);
                let right = wrap_text(&display_value(&change.source2), VALUE_WIDTH);
                let lines = left.len().max(right.len());
                for i in 0..lines {
                    let column = if i == 0 { change.column.as_str() } else { "" };
                    let l = left.get(i).map(String::as_str).unwrap_or("");
                    let r = right.get(i).map(String::as_str).unwrap_or("");
                    let _ = writeln!(
                        out,
                        "    {:<20} {:<w$} {:<w$}",
                        column,
                        l,
                        r,
                        w = VALUE_WIDTH
                    );
                }
            }
        }
    }

    out
}

fn render_records(out: &mut String, title: &str, marker: char, records: &[Record]) {
    let _ = writeln!(out);
    let _ = writeln!(out, "{}: {}", title, records.len());
    for record in records {
        let _ = writeln!(out, "  {} {}", marker, record.describe());
    }
}

fn display_value(value: &CellValue) -> String {
    if value.is_empty() {
        "<null>".to_string()
    } else {
        value.to_string_value()
    }
}

/// Pretty JSON report with summary and full details
pub fn render_json(result: &ComparisonResult) -> Result<String> {
    let summary = Summary::from_result(result);

    let differences: Vec<Value> = result
        .differing
        .iter()
        .map(|diff| {
            let changes: Map<String, Value> = diff
                .changes
                .iter()
                .map(|c| {
                    (
                        c.column.clone(),
                        json!({
                            "target_column": c.target_column,
                            "source1": c.source1,
                            "source2": c.source2,
                        }),
                    )
                })
                .collect();
            json!({ "id": diff.key, "differences": changes })
        })
        .collect();

    let report = json!({
        "summary": summary,
        "details": {
            "only_in_source1": result.only_in_a,
            "only_in_source2": result.only_in_b,
            "differences": differences,
        },
    });
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Summary tables as CSV
pub fn write_csv<W: Write>(result: &ComparisonResult, writer: W) -> Result<()> {
    let summary = Summary::from_result(result);
    let counts = &summary.row_counts;
    let mut csv_writer = csv::WriterBuilder::new().flexible(true).from_writer(writer);

    csv_writer.write_record(["Row Counts"])?;
    for (label, count) in [
        ("unique_to_source1", counts.unique_to_source1),
        ("unique_to_source2", counts.unique_to_source2),
        ("differences", counts.differences),
        ("matched", counts.matched),
    ] {
        csv_writer.write_record([label.to_string(), count.to_string()])?;
    }

    csv_writer.write_record(["Column Statistics"])?;
    csv_writer.write_record(["Column", "Match %", "Difference %"])?;
    for stat in &summary.column_statistics {
        csv_writer.write_record([
            stat.column.as_str(),
            stat.match_percentage.as_str(),
            stat.difference_percentage.as_str(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

/// Greedy word wrap. Words longer than `width` are split so that no line
/// exceeds `width` characters.
pub fn wrap_text(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for word in text.split_whitespace() {
        let mut chars: Vec<char> = word.chars().collect();
        loop {
            let needed = if current_len == 0 { chars.len() } else { current_len + 1 + chars.len() };
            if needed <= width {
                if current_len > 0 {
                    current.push(' ');
                    current_len += 1;
                }
                current.extend(chars.iter());
                current_len += chars.len();
                break;
            }
            if current_len > 0 {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
                continue;
            }
            // Word alone is too long: emit a full-width slice
            let rest = chars.split_off(width);
            lines.push(chars.iter().collect());
            chars = rest;
        }
    }

    if current_len > 0 || lines.is_empty() {
        lines.push(current);
    }
    lines
}
