//! Work items: one dataset row each.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Ordered column values of a dataset row.
pub type Fields = serde_json::Map<String, Value>;

/// Output keys written by the runner. Dataset columns may not use them.
pub const RESERVED_FIELDS: &[&str] = &[
    "row",
    "status",
    "response",
    "extracted_output",
    "extracted_fields",
    "error",
    "attempts",
    "completed_at",
];

/// 1-based row index of a work item in its source dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RowId {
    fn from(value: u64) -> Self {
        RowId(value)
    }
}

/// Canonical form used for every column-name comparison.
pub fn normalize_column(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

/// Returns true if `name` collides with a runner-owned output key.
pub fn is_reserved(name: &str) -> bool {
    let normalized = normalize_column(name);
    RESERVED_FIELDS.contains(&normalized.as_str())
}

/// Outcome of looking a requested column up among available names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnMatch<'a> {
    Found(&'a str),
    Missing,
    Ambiguous(Vec<String>),
}

/// Resolve `requested` against `names`: exact match first, then a unique
/// match after normalization.
pub fn resolve_column<'a, I>(names: I, requested: &str) -> ColumnMatch<'a>
where
    I: IntoIterator<Item = &'a str>,
{
    let wanted = normalize_column(requested);
    let mut candidates = Vec::new();
    for name in names {
        if name == requested {
            return ColumnMatch::Found(name);
        }
        if normalize_column(name) == wanted {
            candidates.push(name);
        }
    }
    match candidates.len() {
        0 => ColumnMatch::Missing,
        1 => ColumnMatch::Found(candidates[0]),
        _ => ColumnMatch::Ambiguous(candidates.into_iter().map(String::from).collect()),
    }
}

/// Render a cell value as plain text.
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// One row of the source dataset. Immutable once read.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    row: RowId,
    fields: Fields,
}

impl WorkItem {
    pub fn new(row: impl Into<RowId>, fields: Fields) -> Self {
        Self {
            row: row.into(),
            fields,
        }
    }

    pub fn row(&self) -> RowId {
        self.row
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Look a column up using the crate-wide column matching rules.
    pub fn get(&self, column: &str) -> Option<&Value> {
        match resolve_column(self.fields.keys().map(String::as_str), column) {
            ColumnMatch::Found(name) => self.fields.get(name),
            _ => None,
        }
    }

    /// Column value rendered as text.
    pub fn text(&self, column: &str) -> Option<String> {
        self.get(column).map(value_to_text)
    }
}
