//! Dataset loading: CSV or JSONL rows into work items.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use csv::ReaderBuilder;
use serde_json::Value;

use crate::error::DataFormatError;
use crate::models::{
    ColumnMatch, DatasetConfig, DatasetFormat, Fields, RowFilter, WorkItem, is_reserved,
    parse_filters, resolve_column,
};

/// Rows read from a dataset file.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    /// Items that passed the filters, in file order.
    pub items: Vec<WorkItem>,
    /// Data rows in the file before filtering.
    pub rows_read: u64,
    /// Column names kept on each item, in order.
    pub columns: Vec<String>,
}

/// Reads a dataset with explicit column binding and row filters.
#[derive(Debug, Clone, Default)]
pub struct DatasetLoader {
    format: Option<DatasetFormat>,
    columns: Vec<String>,
    filters: Vec<RowFilter>,
}

impl DatasetLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &DatasetConfig) -> Result<Self, DataFormatError> {
        Ok(Self {
            format: config.format,
            columns: config.columns.clone(),
            filters: parse_filters(&config.filters)?,
        })
    }

    #[must_use]
    pub fn with_format(mut self, format: DatasetFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Keep only these columns, in this order.
    #[must_use]
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    #[must_use]
    pub fn with_filters(mut self, filters: Vec<RowFilter>) -> Self {
        self.filters = filters;
        self
    }

    pub fn load(&self, path: &Path) -> Result<LoadedDataset, DataFormatError> {
        let format = match self.format {
            Some(format) => format,
            None => DatasetFormat::from_path(path)
                .ok_or_else(|| DataFormatError::UnsupportedFormat(path.display().to_string()))?,
        };

        let (headers, rows) = match format {
            DatasetFormat::Csv => read_csv(path)?,
            DatasetFormat::Jsonl => read_jsonl(path)?,
        };
        let rows_read = rows.len() as u64;

        let selected = self.bind_columns(&headers)?;
        let filters = self.bind_filters(&headers)?;

        let mut items = Vec::with_capacity(rows.len());
        for (index, fields) in rows.into_iter().enumerate() {
            // Row ids are positional in the file, assigned before filtering.
            let item = WorkItem::new(index as u64 + 1, fields);
            if !filters.iter().all(|f| f.matches(&item)) {
                continue;
            }
            items.push(project(item, &selected));
        }

        tracing::info!(
            path = %path.display(),
            format = %format,
            rows = rows_read,
            kept = items.len(),
            "dataset loaded"
        );

        Ok(LoadedDataset {
            items,
            rows_read,
            columns: selected,
        })
    }

    /// Resolve the requested columns to dataset headers.
    fn bind_columns(&self, headers: &[String]) -> Result<Vec<String>, DataFormatError> {
        let selected = if self.columns.is_empty() {
            headers.to_vec()
        } else {
            self.columns
                .iter()
                .map(|requested| bind(headers, requested))
                .collect::<Result<Vec<_>, _>>()?
        };

        if let Some(reserved) = selected.iter().find(|name| is_reserved(name)) {
            return Err(DataFormatError::ReservedColumn(reserved.clone()));
        }
        Ok(selected)
    }

    /// Filters rewritten to name their exact header.
    fn bind_filters(&self, headers: &[String]) -> Result<Vec<RowFilter>, DataFormatError> {
        self.filters
            .iter()
            .map(|filter| {
                Ok(RowFilter {
                    column: bind(headers, &filter.column)?,
                    value: filter.value.clone(),
                })
            })
            .collect()
    }
}

fn bind(headers: &[String], requested: &str) -> Result<String, DataFormatError> {
    match resolve_column(headers.iter().map(String::as_str), requested) {
        ColumnMatch::Found(name) => Ok(name.to_string()),
        ColumnMatch::Missing => Err(DataFormatError::MissingColumn(requested.to_string())),
        ColumnMatch::Ambiguous(candidates) => Err(DataFormatError::AmbiguousColumn {
            requested: requested.to_string(),
            candidates,
        }),
    }
}

fn project(item: WorkItem, columns: &[String]) -> WorkItem {
    let fields: Fields = columns
        .iter()
        .map(|name| {
            let value = item.fields().get(name).cloned().unwrap_or(Value::Null);
            (name.clone(), value)
        })
        .collect();
    WorkItem::new(item.row(), fields)
}

fn read_csv(path: &Path) -> Result<(Vec<String>, Vec<Fields>), DataFormatError> {
    let file = File::open(path).map_err(|e| DataFormatError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let mut reader = ReaderBuilder::new().from_reader(file);

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut seen = HashSet::new();
    if let Some(duplicate) = headers.iter().find(|h| !seen.insert(h.as_str())) {
        return Err(DataFormatError::InvalidRow {
            line: 1,
            message: format!("duplicate column header '{duplicate}'"),
        });
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let fields: Fields = headers
            .iter()
            .zip(record.iter())
            .map(|(name, cell)| (name.clone(), Value::String(cell.to_string())))
            .collect();
        rows.push(fields);
    }
    Ok((headers, rows))
}

/// One JSON object per line. Blank lines are skipped; headers are the union
/// of keys in order of first appearance.
fn read_jsonl(path: &Path) -> Result<(Vec<String>, Vec<Fields>), DataFormatError> {
    let io_err = |e| DataFormatError::Io {
        path: path.to_path_buf(),
        source: e,
    };
    let reader = BufReader::new(File::open(path).map_err(io_err)?);

    let mut headers: Vec<String> = Vec::new();
    let mut known = HashSet::new();
    let mut rows = Vec::new();

    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                return Err(DataFormatError::InvalidRow {
                    line: idx + 1,
                    message: "expected a JSON object".to_string(),
                });
            }
            Err(e) => {
                return Err(DataFormatError::InvalidRow {
                    line: idx + 1,
                    message: e.to_string(),
                });
            }
        };

        for key in fields.keys() {
            if known.insert(key.clone()) {
                headers.push(key.clone());
            }
        }
        rows.push(fields);
    }
    Ok((headers, rows))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RowId;
    use serde_json::json;

    fn write(dir: &tempfile::TempDir, name: &str, content: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    const SPEECHES: &str = "\
Source,Target,Year,Text
USA,UK,1990,We stand together.
FRA,DEU,1991,Cooperation matters.
USA,MEX,1990,Trade benefits both.
";

    #[test]
    fn test_load_csv_keeps_column_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "speeches.csv", SPEECHES);

        let dataset = DatasetLoader::new().load(&path).unwrap();
        assert_eq!(dataset.rows_read, 3);
        assert_eq!(dataset.columns, vec!["Source", "Target", "Year", "Text"]);

        let first = &dataset.items[0];
        assert_eq!(first.row(), RowId(1));
        let keys: Vec<&str> = first.fields().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Source", "Target", "Year", "Text"]);
        assert_eq!(first.text("source").unwrap(), "USA");
    }

    #[test]
    fn test_columns_are_bound_case_insensitively() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "speeches.csv", SPEECHES);

        let dataset = DatasetLoader::new()
            .with_columns(vec!["text".into(), " YEAR ".into()])
            .load(&path)
            .unwrap();
        assert_eq!(dataset.columns, vec!["Text", "Year"]);
        let keys: Vec<&str> = dataset.items[1].fields().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Text", "Year"]);
    }

    #[test]
    fn test_missing_and_ambiguous_columns_fail() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "speeches.csv", SPEECHES);
        let err = DatasetLoader::new()
            .with_columns(vec!["speaker".into()])
            .load(&path)
            .unwrap_err();
        assert!(matches!(err, DataFormatError::MissingColumn(c) if c == "speaker"));

        let path = write(&dir, "iso.csv", "iso,ISO,text\nUSA,usa,hello\n");
        let err = DatasetLoader::new()
            .with_columns(vec!["Iso".into()])
            .load(&path)
            .unwrap_err();
        assert!(matches!(err, DataFormatError::AmbiguousColumn { .. }));

        // An exact match is never ambiguous.
        let dataset = DatasetLoader::new()
            .with_columns(vec!["ISO".into()])
            .load(&path)
            .unwrap();
        assert_eq!(dataset.items[0].text("ISO").unwrap(), "usa");
    }

    #[test]
    fn test_reserved_column_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "bad.csv", "text,Status\nhello,done\n");
        let err = DatasetLoader::new().load(&path).unwrap_err();
        assert!(matches!(err, DataFormatError::ReservedColumn(c) if c == "Status"));

        // Not selected, so not written.
        let dataset = DatasetLoader::new()
            .with_columns(vec!["text".into()])
            .load(&path)
            .unwrap();
        assert_eq!(dataset.items.len(), 1);
    }

    #[test]
    fn test_filters_keep_original_row_ids() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "speeches.csv", SPEECHES);

        let dataset = DatasetLoader::new()
            .with_filters(vec!["year=1990".parse().unwrap()])
            .with_columns(vec!["text".into()])
            .load(&path)
            .unwrap();
        let rows: Vec<RowId> = dataset.items.iter().map(WorkItem::row).collect();
        assert_eq!(rows, vec![RowId(1), RowId(3)]);
        assert_eq!(dataset.rows_read, 3);
    }

    #[test]
    fn test_filter_on_unknown_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "speeches.csv", SPEECHES);
        let err = DatasetLoader::new()
            .with_filters(vec!["decade=1990s".parse().unwrap()])
            .load(&path)
            .unwrap_err();
        assert!(matches!(err, DataFormatError::MissingColumn(_)));
    }

    #[test]
    fn test_load_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            &dir,
            "speeches.jsonl",
            "{\"source\":\"USA\",\"year\":1990}\n\n{\"source\":\"FRA\",\"year\":1991,\"text\":\"hi\"}\n",
        );

        let dataset = DatasetLoader::new().load(&path).unwrap();
        assert_eq!(dataset.rows_read, 2);
        assert_eq!(dataset.columns, vec!["source", "year", "text"]);
        assert_eq!(dataset.items[1].row(), RowId(2));
        assert_eq!(dataset.items[0].get("year"), Some(&json!(1990)));
        assert_eq!(dataset.items[0].get("text"), Some(&Value::Null));
    }

    #[test]
    fn test_jsonl_non_object_line_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "bad.jsonl", "{\"a\":1}\n[1,2]\n");
        let err = DatasetLoader::new().load(&path).unwrap_err();
        assert!(matches!(err, DataFormatError::InvalidRow { line: 2, .. }));
    }

    #[test]
    fn test_unknown_extension_needs_explicit_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(&dir, "speeches.txt", SPEECHES);
        assert!(matches!(
            DatasetLoader::new().load(&path),
            Err(DataFormatError::UnsupportedFormat(_))
        ));
        let dataset = DatasetLoader::new()
            .with_format(DatasetFormat::Csv)
            .load(&path)
            .unwrap();
        assert_eq!(dataset.items.len(), 3);
    }
}
