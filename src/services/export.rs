//! Combine stored results into a single file, one record per row.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::StoreError;
use crate::models::{RunRecord, value_to_text};
use crate::services::store::OutputStore;
use crate::utils::file::write_atomic;

/// Which records to export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFilter {
    #[default]
    All,
    Succeeded,
    Failed,
}

impl ExportFilter {
    pub fn keeps(&self, record: &RunRecord) -> bool {
        match self {
            ExportFilter::All => true,
            ExportFilter::Succeeded => record.is_success(),
            ExportFilter::Failed => !record.is_success(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Jsonl,
    Csv,
}

impl ExportFormat {
    /// `.csv` exports as CSV, anything else as JSONL.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => ExportFormat::Csv,
            _ => ExportFormat::Jsonl,
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jsonl" | "ndjson" => Ok(ExportFormat::Jsonl),
            "csv" => Ok(ExportFormat::Csv),
            _ => Err(format!("unknown export format: {}", s)),
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Jsonl => write!(f, "jsonl"),
            ExportFormat::Csv => write!(f, "csv"),
        }
    }
}

/// What an export wrote.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub path: PathBuf,
    pub format: ExportFormat,
    pub filter: ExportFilter,
    pub records: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Sort by row id, keep the first record per row, then apply `filter`.
pub fn combine(mut records: Vec<RunRecord>, filter: ExportFilter) -> Vec<RunRecord> {
    records.sort_by_key(|r| r.row);
    records.dedup_by_key(|r| r.row);
    records.retain(|r| filter.keeps(r));
    records
}

/// Export everything in `store` to `out`.
pub fn export_store<S: OutputStore + ?Sized>(
    store: &S,
    out: &Path,
    format: ExportFormat,
    filter: ExportFilter,
) -> Result<ExportReport, StoreError> {
    let records = combine(store.load_records()?, filter);
    write_records(&records, out, format)?;

    let succeeded = records.iter().filter(|r| r.is_success()).count();
    tracing::info!(
        path = %out.display(),
        format = %format,
        records = records.len(),
        "results exported"
    );
    Ok(ExportReport {
        path: out.to_path_buf(),
        format,
        filter,
        records: records.len(),
        succeeded,
        failed: records.len() - succeeded,
    })
}

/// Write records to `path`, replacing it atomically.
pub fn write_records(records: &[RunRecord], path: &Path, format: ExportFormat) -> Result<(), StoreError> {
    let content = match format {
        ExportFormat::Jsonl => to_jsonl(records)?,
        ExportFormat::Csv => to_csv(records).map_err(|e| StoreError::io(path, e))?,
    };
    write_atomic(path, &content).map_err(|e| StoreError::io(path, e))
}

fn to_jsonl(records: &[RunRecord]) -> Result<Vec<u8>, StoreError> {
    let mut out = Vec::new();
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.push(b'\n');
    }
    Ok(out)
}

/// Flatten records to CSV. Columns are the union of record keys in order of
/// first appearance; nested values are written as JSON text.
fn to_csv(records: &[RunRecord]) -> std::io::Result<Vec<u8>> {
    let rows: Vec<serde_json::Map<String, Value>> = records
        .iter()
        .map(|r| match serde_json::to_value(r) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(std::io::Error::other("record did not serialize to an object")),
            Err(e) => Err(std::io::Error::other(e)),
        })
        .collect::<Result<_, _>>()?;

    let mut columns: Vec<&str> = Vec::new();
    let mut known = HashSet::new();
    for row in &rows {
        for key in row.keys() {
            if known.insert(key.as_str()) {
                columns.push(key);
            }
        }
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&columns).map_err(std::io::Error::other)?;
    for row in &rows {
        let cells = columns.iter().map(|col| match row.get(*col) {
            Some(value @ (Value::Object(_) | Value::Array(_))) => value.to_string(),
            Some(value) => value_to_text(value),
            None => String::new(),
        });
        writer.write_record(cells).map_err(std::io::Error::other)?;
    }
    writer.into_inner().map_err(|e| std::io::Error::other(e.to_string()))
}
