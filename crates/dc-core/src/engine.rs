//! Reconciliation engine: partitions two tables by composite key and diffs
//! the rows present on both sides.

use crate::error::{Error, Result};
use crate::identifier::{composite_key, find_duplicates, KeyValue};
use crate::mapper::ColumnMapping;
use crate::table::{CellValue, Record, Table};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// What to do when a composite key occurs more than once in one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicatePolicy {
    /// The last row with a key replaces earlier ones
    #[default]
    KeepLast,
    /// The first row with a key is kept
    KeepFirst,
    /// Abort the comparison
    Fail,
}

/// Comparison settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareOptions {
    /// When false, values are lowercased before comparing
    pub case_sensitive: bool,
    /// When true, leading/trailing whitespace is ignored
    pub trim_whitespace: bool,
    /// Source-1 columns to compare; defaults to every mapped non-key column
    pub columns_to_compare: Option<Vec<String>>,
    /// Handling of duplicate keys within one table
    pub duplicate_policy: DuplicatePolicy,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            trim_whitespace: false,
            columns_to_compare: None,
            duplicate_policy: DuplicatePolicy::default(),
        }
    }
}

impl CompareOptions {
    fn normalize<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let text = if self.trim_whitespace { text.trim() } else { text };
        if self.case_sensitive {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(text.to_lowercase())
        }
    }

    /// Null-aware equality: two nulls match, a null never matches a value,
    /// and values match when their normalised text is identical.
    pub fn values_equal(&self, a: &CellValue, b: &CellValue) -> bool {
        match (a.as_text(), b.as_text()) {
            (None, None) => true,
            (Some(x), Some(y)) => self.normalize(&x) == self.normalize(&y),
            _ => false,
        }
    }
}

/// A column whose values differ for one key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CellChange {
    /// Source-1 column name
    pub column: String,
    /// Source-2 column it was compared against
    pub target_column: String,
    /// Raw source-1 value
    pub source1: CellValue,
    /// Raw source-2 value
    pub source2: CellValue,
}

/// A key present in both tables with at least one differing column
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowDiff {
    /// Key column values (source-1 names)
    pub key: Record,
    /// Differing columns only
    pub changes: Vec<CellChange>,
}

/// Match statistics for one compared column over the common rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnStat {
    pub column: String,
    pub matches: usize,
    pub total: usize,
    pub match_ratio: f64,
}

/// Outcome of comparing two tables
#[derive(Debug, Clone, Serialize)]
pub struct ComparisonResult {
    /// Source-1 key columns used for the join
    pub key_columns: Vec<String>,
    /// Source-1 columns that were compared
    pub compared_columns: Vec<String>,
    /// Rows whose key exists only in source 1
    pub only_in_a: Vec<Record>,
    /// Rows whose key exists only in source 2
    pub only_in_b: Vec<Record>,
    /// Common keys with differences
    pub differing: Vec<RowDiff>,
    /// Per-column match ratios, empty when no key is common
    pub column_stats: Vec<ColumnStat>,
    /// Number of keys present in both sources
    pub common_rows: usize,
}

impl ComparisonResult {
    /// Match ratio of a compared column
    pub fn match_ratio(&self, column: &str) -> Option<f64> {
        self.column_stats
            .iter()
            .find(|s| s.column == column)
            .map(|s| s.match_ratio)
    }

    /// Common rows without any difference
    pub fn matched_rows(&self) -> usize {
        self.common_rows - self.differing.len()
    }

    /// True when both sources hold the same keys with the same values
    pub fn is_identical(&self) -> bool {
        self.only_in_a.is_empty() && self.only_in_b.is_empty() && self.differing.is_empty()
    }
}

/// Key and column indices resolved against both tables
struct ComparePlan {
    key_a: Vec<Option<usize>>,
    key_b: Vec<Option<usize>>,
    key_b_names: Vec<String>,
    columns: Vec<PlannedColumn>,
}

struct PlannedColumn {
    name: String,
    target: String,
    index_a: Option<usize>,
    index_b: Option<usize>,
}

impl ComparePlan {
    fn resolve<S: AsRef<str>>(
        a: &Table,
        b: &Table,
        key_columns: &[S],
        mapping: &ColumnMapping,
        options: &CompareOptions,
    ) -> Result<Self> {
        let mut problems = Vec::new();

        if key_columns.is_empty() {
            problems.push("at least one ID column is required".to_string());
        }

        let mut key_a = Vec::new();
        let mut key_b = Vec::new();
        let mut key_b_names = Vec::new();
        for key in key_columns {
            let key = key.as_ref();
            // An unmapped key column is looked up under the same name
            let target = mapping.get(key).unwrap_or(key);
            let index_a = a.column_index(key);
            let index_b = b.column_index(target);
            if index_a.is_none() {
                problems.push(format!("ID column '{key}' not found in source1"));
            }
            if index_b.is_none() {
                problems.push(format!("ID column '{key}' (as '{target}') not found in source2"));
            }
            key_a.push(index_a);
            key_b.push(index_b);
            key_b_names.push(target.to_string());
        }

        let selected: Vec<String> = match &options.columns_to_compare {
            Some(cols) => cols.clone(),
            None => mapping
                .iter()
                .map(|(s, _)| s)
                .filter(|s| !key_columns.iter().any(|k| k.as_ref() == *s))
                .map(str::to_string)
                .collect(),
        };

        let mut columns = Vec::new();
        for name in selected {
            match mapping.get(&name) {
                Some(target) => columns.push(PlannedColumn {
                    index_a: a.column_index(&name),
                    index_b: b.column_index(target),
                    target: target.to_string(),
                    name,
                }),
                None => problems.push(format!("column '{name}' is not in the column mapping")),
            }
        }

        if !problems.is_empty() {
            return Err(Error::Configuration(problems));
        }

        Ok(Self {
            key_a,
            key_b,
            key_b_names,
            columns,
        })
    }
}

/// Composite key to row index, plus keys in order of first appearance
#[derive(Default)]
struct KeyIndex {
    order: Vec<KeyValue>,
    rows: HashMap<KeyValue, usize>,
    discarded: usize,
}

impl KeyIndex {
    fn build(table: &Table, key_indices: &[Option<usize>], policy: DuplicatePolicy) -> Self {
        let mut index = KeyIndex::default();
        for row_idx in 0..table.row_count() {
            let key = composite_key(table, row_idx, key_indices);
            match index.rows.entry(key) {
                Entry::Vacant(entry) => {
                    index.order.push(entry.key().clone());
                    entry.insert(row_idx);
                }
                Entry::Occupied(mut entry) => {
                    index.discarded += 1;
                    if policy == DuplicatePolicy::KeepLast {
                        entry.insert(row_idx);
                    }
                }
            }
        }
        if index.discarded > 0 {
            warn!(
                path = %table.source_path.display(),
                discarded = index.discarded,
                ?policy,
                "duplicate keys collapsed to one row each"
            );
        }
        index
    }
}

/// Compare two tables joined on `key_columns`.
///
/// Key columns are source-1 names; the source-2 side uses the mapped name,
/// or the same name when the key is not mapped. Fails with
/// [`Error::Configuration`] before any partitioning when a key or compared
/// column cannot be resolved.
#[instrument(
    level = "debug",
    skip_all,
    fields(source1 = %a.source_path.display(), source2 = %b.source_path.display())
)]
pub fn compare<S: AsRef<str>>(
    a: &Table,
    b: &Table,
    key_columns: &[S],
    mapping: &ColumnMapping,
    options: &CompareOptions,
) -> Result<ComparisonResult> {
    let plan = ComparePlan::resolve(a, b, key_columns, mapping, options)?;
    let key_names: Vec<String> = key_columns.iter().map(|k| k.as_ref().to_string()).collect();

    if options.duplicate_policy == DuplicatePolicy::Fail {
        let mut problems: Vec<String> = find_duplicates(&key_names, a)
            .iter()
            .map(|d| format!("source1: {} ({} rows)", d.describe(), d.count))
            .collect();
        problems.extend(
            find_duplicates(&plan.key_b_names, b)
                .iter()
                .map(|d| format!("source2: {} ({} rows)", d.describe(), d.count)),
        );
        if !problems.is_empty() {
            return Err(Error::DuplicateKeys(problems));
        }
    }

    let index_a = KeyIndex::build(a, &plan.key_a, options.duplicate_policy);
    let index_b = KeyIndex::build(b, &plan.key_b, options.duplicate_policy);

    let only_in_a: Vec<Record> = index_a
        .order
        .iter()
        .filter(|key| !index_b.rows.contains_key(*key))
        .map(|key| a.record(index_a.rows[key]))
        .collect();
    let only_in_b: Vec<Record> = index_b
        .order
        .iter()
        .filter(|key| !index_a.rows.contains_key(*key))
        .map(|key| b.record(index_b.rows[key]))
        .collect();

    let mut matches = vec![0usize; plan.columns.len()];
    let mut differing = Vec::new();
    let mut common_rows = 0;

    for key in &index_a.order {
        let Some(&row_b) = index_b.rows.get(key) else {
            continue;
        };
        let row_a = index_a.rows[key];
        common_rows += 1;

        let mut changes = Vec::new();
        for (i, col) in plan.columns.iter().enumerate() {
            let value_a = cell(a, row_a, col.index_a);
            let value_b = cell(b, row_b, col.index_b);
            if options.values_equal(value_a, value_b) {
                matches[i] += 1;
            } else {
                changes.push(CellChange {
                    column: col.name.clone(),
                    target_column: col.target.clone(),
                    source1: value_a.clone(),
                    source2: value_b.clone(),
                });
            }
        }

        if !changes.is_empty() {
            let fields = key_names
                .iter()
                .zip(&plan.key_a)
                .map(|(name, idx)| (name.clone(), cell(a, row_a, *idx).clone()))
                .collect();
            differing.push(RowDiff {
                key: Record { fields },
                changes,
            });
        }
    }

    let column_stats = if common_rows == 0 {
        Vec::new()
    } else {
        plan.columns
            .iter()
            .zip(matches)
            .map(|(col, matches)| ColumnStat {
                column: col.name.clone(),
                matches,
                total: common_rows,
                match_ratio: matches as f64 / common_rows as f64,
            })
            .collect()
    };

    debug!(
        only_in_a = only_in_a.len(),
        only_in_b = only_in_b.len(),
        common = common_rows,
        differing = differing.len(),
        "comparison complete"
    );

    Ok(ComparisonResult {
        key_columns: key_names,
        compared_columns: plan.columns.into_iter().map(|c| c.name).collect(),
        only_in_a,
        only_in_b,
        differing,
        column_stats,
        common_rows,
    })
}

fn cell(table: &Table, row_idx: usize, col: Option<usize>) -> &CellValue {
    const NULL: &CellValue = &CellValue::Empty;
    col.and_then(|c| table.rows[row_idx].get(c)).unwrap_or(NULL)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{parse_csv_str, parse_jsonl_str};
    use std::collections::HashSet;

    fn table(csv: &str, name: &str) -> Table {
        parse_csv_str(csv, name, b',').unwrap()
    }

    fn identity(cols: &[&str]) -> ColumnMapping {
        cols.iter().map(|c| (*c, *c)).collect()
    }

    fn basic() -> (Table, Table) {
        (
            table("id,name,value\n1,Alice,100\n2,Bob,200\n3,Charlie,300\n", "a.csv"),
            table("id,name,value\n1,Alice,100\n2,Bob,250\n4,David,400\n", "b.csv"),
        )
    }

    #[test]
    fn test_basic_comparison() {
        let (a, b) = basic();
        let result = compare(&a, &b, &["id"], &identity(&["name", "value"]), &CompareOptions::default()).unwrap();

        assert_eq!(result.only_in_a.len(), 1);
        assert_eq!(result.only_in_a[0].describe(), "id=3, name=Charlie, value=300");
        assert_eq!(result.only_in_b.len(), 1);
        assert_eq!(result.only_in_b[0].describe(), "id=4, name=David, value=400");

        assert_eq!(result.differing.len(), 1);
        let diff = &result.differing[0];
        assert_eq!(diff.key.describe(), "id=2");
        assert_eq!(diff.changes.len(), 1);
        assert_eq!(diff.changes[0].column, "value");
        assert_eq!(diff.changes[0].source1, CellValue::String("200".into()));
        assert_eq!(diff.changes[0].source2, CellValue::String("250".into()));

        assert_eq!(result.match_ratio("name"), Some(1.0));
        assert_eq!(result.match_ratio("value"), Some(0.5));
        assert_eq!(result.common_rows, 2);
        assert_eq!(result.matched_rows(), 1);
    }

    #[test]
    fn test_identical_inputs() {
        let (a, _) = basic();
        let result = compare(&a, &a.clone(), &["id"], &identity(&["id", "name", "value"]), &CompareOptions::default()).unwrap();

        assert!(result.is_identical());
        // Key columns are excluded from the default comparison set
        assert_eq!(result.compared_columns, vec!["name", "value"]);
        assert!(result.column_stats.iter().all(|s| s.match_ratio == 1.0));
    }

    #[test]
    fn test_partition_is_complete_and_disjoint() {
        let a = table("id,v\n1,x\n2,x\n3,x\n5,x\n", "a.csv");
        let b = table("id,v\n2,x\n3,y\n4,x\n6,x\n", "b.csv");
        let result = compare(&a, &b, &["id"], &identity(&["v"]), &CompareOptions::default()).unwrap();

        let ids = |records: &[Record]| -> HashSet<String> {
            records.iter().map(|r| r.get("id").unwrap().to_string()).collect()
        };
        let only_a = ids(&result.only_in_a);
        let only_b = ids(&result.only_in_b);
        assert_eq!(only_a, ["1", "5"].iter().map(|s| s.to_string()).collect::<HashSet<_>>());
        assert_eq!(only_b, ["4", "6"].iter().map(|s| s.to_string()).collect::<HashSet<_>>());
        assert!(only_a.is_disjoint(&only_b));
        assert_eq!(only_a.len() + only_b.len() + result.common_rows, 6);
    }

    #[test]
    fn test_large_integer_keys_stay_distinct() {
        let jsonl = "{\"id\": 18446744073709551615, \"v\": \"a\"}\n{\"id\": 18446744073709551614, \"v\": \"b\"}\n";
        let a = parse_jsonl_str(jsonl, "a.jsonl").unwrap();
        let b = parse_jsonl_str(jsonl, "b.jsonl").unwrap();
        let result = compare(&a, &b, &["id"], &identity(&["v"]), &CompareOptions::default()).unwrap();

        assert_eq!(result.common_rows, 2);
        assert!(result.is_identical());
    }

    #[test]
    fn test_json_float_text_matches_csv_text() {
        let a = table("id,v\n1,100.0\n2,100\n", "a.csv");
        let b = parse_jsonl_str("{\"id\": 1, \"v\": 100.0}\n{\"id\": 2, \"v\": 100.0}\n", "b.jsonl").unwrap();
        let result = compare(&a, &b, &["id"], &identity(&["v"]), &CompareOptions::default()).unwrap();

        assert_eq!(result.common_rows, 2);
        // Numbers compare by their text, so 100 and 100.0 differ
        assert_eq!(result.differing.len(), 1);
        assert_eq!(result.differing[0].key.describe(), "id=2");
    }

    #[test]
    fn test_null_handling() {
        let a = table("id,x,y\n1,,\n2,,z\n", "a.csv");
        let b = table("id,x,y\n1,,\n2,,\n", "b.csv");
        let result = compare(&a, &b, &["id"], &identity(&["x", "y"]), &CompareOptions::default()).unwrap();

        // Both-null matches; null against a value differs
        assert_eq!(result.match_ratio("x"), Some(1.0));
        assert_eq!(result.match_ratio("y"), Some(0.5));
        assert_eq!(result.differing.len(), 1);
        assert_eq!(result.differing[0].changes[0].column, "y");
        assert_eq!(result.differing[0].changes[0].source2, CellValue::Empty);
    }

    #[test]
    fn test_null_is_not_empty_string() {
        let a = Table::from_rows("a", &["id", "x"], vec![vec![CellValue::Number(1.into()), CellValue::String(String::new())]]);
        let b = Table::from_rows("b", &["id", "x"], vec![vec![CellValue::Number(1.into()), CellValue::Empty]]);
        let result = compare(&a, &b, &["id"], &identity(&["x"]), &CompareOptions::default()).unwrap();
        assert_eq!(result.differing.len(), 1);
    }

    #[test]
    fn test_case_insensitive_comparison() {
        let a = table("id,name\n1,Alice\n", "a.csv");
        let b = table("id,name\n1,ALICE\n", "b.csv");
        let mapping = identity(&["name"]);

        let strict = compare(&a, &b, &["id"], &mapping, &CompareOptions::default()).unwrap();
        assert_eq!(strict.differing.len(), 1);

        let options = CompareOptions {
            case_sensitive: false,
            ..Default::default()
        };
        let relaxed = compare(&a, &b, &["id"], &mapping, &options).unwrap();
        assert!(relaxed.differing.is_empty());
    }

    #[test]
    fn test_string_trimming() {
        let a = table("id,name\n1,Alice  \n", "a.csv");
        let b = table("id,name\n1,  Alice\n", "b.csv");
        let mapping = identity(&["name"]);

        let strict = compare(&a, &b, &["id"], &mapping, &CompareOptions::default()).unwrap();
        assert_eq!(strict.differing.len(), 1);

        let options = CompareOptions {
            trim_whitespace: true,
            ..Default::default()
        };
        let trimmed = compare(&a, &b, &["id"], &mapping, &options).unwrap();
        assert!(trimmed.differing.is_empty());
        assert_eq!(trimmed.match_ratio("name"), Some(1.0));
    }

    #[test]
    fn test_column_selection() {
        let a = table("id,name,value\n1,Alice,100\n", "a.csv");
        let b = table("id,name,value\n1,Alice,200\n", "b.csv");
        let options = CompareOptions {
            columns_to_compare: Some(vec!["name".to_string()]),
            ..Default::default()
        };
        let result = compare(&a, &b, &["id"], &identity(&["name", "value"]), &options).unwrap();

        assert!(result.differing.is_empty());
        assert_eq!(result.match_ratio("value"), None);
        assert_eq!(result.column_stats.len(), 1);
    }

    #[test]
    fn test_mapped_columns_and_keys() {
        let a = table("id,name\n1,Alice\n2,Bob\n", "a.csv");
        let b = table("product_id,product_name\n1,Alice\n2,Robert\n", "b.csv");
        let mapping: ColumnMapping = [("id", "product_id"), ("name", "product_name")].into_iter().collect();
        let result = compare(&a, &b, &["id"], &mapping, &CompareOptions::default()).unwrap();

        assert_eq!(result.common_rows, 2);
        assert_eq!(result.differing.len(), 1);
        assert_eq!(result.differing[0].changes[0].target_column, "product_name");
    }

    #[test]
    fn test_composite_key() {
        let a = table("region,id,v\nEU,1,a\nUS,1,b\n", "a.csv");
        let b = table("region,id,v\nEU,1,a\nUS,1,c\n", "b.csv");
        let result = compare(&a, &b, &["region", "id"], &identity(&["v"]), &CompareOptions::default()).unwrap();

        assert_eq!(result.common_rows, 2);
        assert_eq!(result.differing.len(), 1);
        assert_eq!(result.differing[0].key.describe(), "region=US, id=1");
    }

    #[test]
    fn test_no_common_rows_yields_empty_stats() {
        let a = table("id,v\n1,x\n", "a.csv");
        let b = table("id,v\n2,x\n", "b.csv");
        let result = compare(&a, &b, &["id"], &identity(&["v"]), &CompareOptions::default()).unwrap();
        assert!(result.column_stats.is_empty());
        assert_eq!(result.common_rows, 0);
    }

    #[test]
    fn test_duplicate_keys_keep_last_by_default() {
        let a = table("id,v\n1,first\n1,second\n", "a.csv");
        let b = table("id,v\n1,second\n", "b.csv");
        let mapping = identity(&["v"]);

        let result = compare(&a, &b, &["id"], &mapping, &CompareOptions::default()).unwrap();
        assert!(result.is_identical());

        let options = CompareOptions {
            duplicate_policy: DuplicatePolicy::KeepFirst,
            ..Default::default()
        };
        let result = compare(&a, &b, &["id"], &mapping, &options).unwrap();
        assert_eq!(result.differing.len(), 1);
        assert_eq!(result.differing[0].changes[0].source1, CellValue::String("first".into()));
    }

    #[test]
    fn test_duplicate_keys_fail_policy() {
        let a = table("id,v\n1,first\n1,second\n", "a.csv");
        let b = table("id,v\n2,x\n2,y\n2,z\n", "b.csv");
        let options = CompareOptions {
            duplicate_policy: DuplicatePolicy::Fail,
            ..Default::default()
        };
        match compare(&a, &b, &["id"], &identity(&["v"]), &options) {
            Err(Error::DuplicateKeys(problems)) => {
                assert_eq!(problems, vec!["source1: id=1 (2 rows)", "source2: id=2 (3 rows)"]);
            }
            other => panic!("expected duplicate key error, got {other:?}"),
        }
    }

    #[test]
    fn test_configuration_errors_are_collected() {
        let (a, b) = basic();
        let options = CompareOptions {
            columns_to_compare: Some(vec!["name".to_string(), "unknown".to_string()]),
            ..Default::default()
        };
        match compare(&a, &b, &["id", "missing_key"], &identity(&["name"]), &options) {
            Err(Error::Configuration(problems)) => {
                assert_eq!(problems.len(), 3);
                assert!(problems[0].contains("'missing_key' not found in source1"));
                assert!(problems[2].contains("'unknown' is not in the column mapping"));
            }
            other => panic!("expected configuration error, got {other:?}"),
        }

        let no_keys: [&str; 0] = [];
        assert!(matches!(
            compare(&a, &b, &no_keys, &identity(&["name"]), &CompareOptions::default()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_values_equal_rules() {
        let opts = CompareOptions {
            case_sensitive: false,
            trim_whitespace: true,
            ..Default::default()
        };
        assert!(opts.values_equal(&CellValue::Empty, &CellValue::Empty));
        assert!(!opts.values_equal(&CellValue::Empty, &CellValue::String("x".into())));
        assert!(opts.values_equal(&CellValue::Number(100.into()), &CellValue::String(" 100 ".into())));
        assert!(opts.values_equal(&CellValue::Bool(true), &CellValue::String("TRUE".into())));
    }
}
