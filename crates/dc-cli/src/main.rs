//! datacompare CLI
//!
//! Command-line tool for comparing two CSV/JSONL data sources by key.

use clap::{Parser, ValueEnum};
use dc_core::identifier::matches_id_pattern;
use dc_core::{
    auto_map, compare, detect_id_columns, find_duplicates, load_mapping_config, read_source,
    render_console, render_json, validate_id_columns, validate_mapping, write_csv,
    ColumnMapping, CompareOptions, DuplicateKey, DuplicatePolicy, Table,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "datacompare")]
#[command(about = "Compare two data sources and identify differences", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to first data source
    source1: PathBuf,

    /// Path to second data source
    source2: PathBuf,

    /// Path to mapping configuration file (JSON)
    #[arg(long)]
    mapping: Option<PathBuf>,

    /// Comma-separated list of ID columns
    #[arg(long, value_delimiter = ',')]
    id_columns: Option<Vec<String>>,

    /// Comma-separated list of columns to compare
    #[arg(long, value_delimiter = ',')]
    compare_columns: Option<Vec<String>>,

    /// Field delimiter for CSV sources (a single ASCII character)
    #[arg(long, default_value = ",", value_parser = parse_delimiter)]
    delimiter: u8,

    /// Compare values case-sensitively
    #[arg(long)]
    case_sensitive: bool,

    /// Keep leading/trailing whitespace when comparing
    #[arg(long)]
    no_trim: bool,

    /// Number of rows used to detect and validate ID columns
    #[arg(long, default_value_t = 1000)]
    sample_size: usize,

    /// How to handle duplicate keys within one source
    #[arg(long, value_enum, default_value_t = OnDuplicate::KeepLast)]
    on_duplicate: OnDuplicate,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Console)]
    output_format: OutputFormat,

    /// Path to output file (defaults to stdout)
    #[arg(long)]
    output_file: Option<PathBuf>,

    /// Only show the summary in console output
    #[arg(long)]
    no_diff: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Console,
    Json,
    Csv,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OnDuplicate {
    KeepLast,
    KeepFirst,
    Fail,
}

impl From<OnDuplicate> for DuplicatePolicy {
    fn from(value: OnDuplicate) -> Self {
        match value {
            OnDuplicate::KeepLast => DuplicatePolicy::KeepLast,
            OnDuplicate::KeepFirst => DuplicatePolicy::KeepFirst,
            OnDuplicate::Fail => DuplicatePolicy::Fail,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> dc_core::Result<()> {
    let source1 = read_source(&cli.source1, cli.delimiter)?;
    let source2 = read_source(&cli.source2, cli.delimiter)?;
    info!(
        rows1 = source1.row_count(),
        rows2 = source2.row_count(),
        "loaded sources"
    );

    let mapping = resolve_mapping(&cli, &source1, &source2)?;
    let sample = source1.head(cli.sample_size);
    let id_columns = resolve_id_columns(&cli, &sample)?;

    let violations = validate_id_columns(&id_columns, &sample);
    if violations.iter().any(|v| v.is_fatal()) {
        return Err(dc_core::Error::IdColumns(violations));
    }
    for violation in &violations {
        eprintln!("Warning: {}", violation);
    }

    report_duplicates("source1", &id_columns, &sample);
    // Source 2 uses the mapped key names
    let id_columns2: Vec<String> = id_columns
        .iter()
        .map(|c| mapping.get(c).unwrap_or(c.as_str()).to_string())
        .collect();
    report_duplicates("source2", &id_columns2, &source2.head(cli.sample_size));

    let options = CompareOptions {
        case_sensitive: cli.case_sensitive,
        trim_whitespace: !cli.no_trim,
        columns_to_compare: cli.compare_columns.clone(),
        duplicate_policy: cli.on_duplicate.into(),
    };
    debug!(?options, ?id_columns, "comparing");

    let result = compare(&source1, &source2, &id_columns, &mapping, &options)?;

    let mut writer: Box<dyn Write> = match &cli.output_file {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(io::stdout().lock()),
    };

    match cli.output_format {
        OutputFormat::Console => write!(writer, "{}", render_console(&result, !cli.no_diff))?,
        OutputFormat::Json => writeln!(writer, "{}", render_json(&result)?)?,
        OutputFormat::Csv => write_csv(&result, &mut writer)?,
    }
    writer.flush()?;

    if let Some(path) = &cli.output_file {
        eprintln!("Report written to {}", path.display());
    }

    Ok(())
}

fn parse_delimiter(value: &str) -> Result<u8, String> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if c.is_ascii() => Ok(c as u8),
        _ => Err(format!("'{}' is not a single ASCII character", value)),
    }
}

fn resolve_mapping(cli: &Cli, source1: &Table, source2: &Table) -> dc_core::Result<ColumnMapping> {
    let columns1 = source1.column_names();
    let columns2 = source2.column_names();

    let mapping = match &cli.mapping {
        Some(path) => {
            let config = load_mapping_config(path)?;
            debug!(source1 = %config.source1, source2 = %config.source2, "loaded mapping config");
            config.column_mapping
        }
        None => {
            let mapping = auto_map(&columns1, &columns2);
            for column in columns1.iter().filter(|c| !mapping.contains(c)) {
                eprintln!("Warning: column '{}' has no match in source2 and will not be compared", column);
            }
            mapping
        }
    };

    validate_mapping(&mapping, &columns1, &columns2)?;
    Ok(mapping)
}

fn resolve_id_columns(cli: &Cli, sample: &Table) -> dc_core::Result<Vec<String>> {
    if let Some(columns) = &cli.id_columns {
        return Ok(columns.iter().map(|c| c.trim().to_string()).collect());
    }

    // Every candidate is reported, but only one becomes the key: the first
    // name-pattern match, else the first column with unique values
    let detected = detect_id_columns(sample);
    let chosen = detected
        .iter()
        .find(|c| matches_id_pattern(c))
        .or_else(|| detected.first())
        .cloned()
        .ok_or_else(|| {
            dc_core::Error::Configuration(vec![
                "no ID columns could be detected; specify them with --id-columns".to_string(),
            ])
        })?;
    eprintln!(
        "Detected ID column candidates: {}; using '{}'",
        detected.join(", "),
        chosen
    );
    Ok(vec![chosen])
}

fn report_duplicates(label: &str, id_columns: &[String], sample: &Table) {
    let duplicates = sample_duplicates(id_columns, sample);
    if duplicates.is_empty() {
        return;
    }
    eprintln!("Warning: {} duplicate key(s) in {}:", duplicates.len(), label);
    for duplicate in duplicates.iter().take(10) {
        eprintln!("  {} ({} rows)", duplicate.describe(), duplicate.count);
    }
    if duplicates.len() > 10 {
        eprintln!("  ... ({} more)", duplicates.len() - 10);
    }
}

/// Duplicate keys in the sample. A missing key column yields nothing here;
/// the comparison reports it as a configuration error.
fn sample_duplicates(id_columns: &[String], sample: &Table) -> Vec<DuplicateKey> {
    if id_columns.iter().any(|c| sample.column_index(c).is_none()) {
        debug!(?id_columns, "skipping duplicate check, key column missing");
        return Vec::new();
    }
    find_duplicates(id_columns, sample)
}
