//! Row filters for narrowing a dataset before a run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::item::WorkItem;
use crate::error::DataFormatError;

/// Equality filter on one column, in the format `column=value`.
///
/// Both sides are compared trimmed and case-insensitively, so `year=1990`
/// keeps rows whose `Year` cell is `" 1990"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RowFilter {
    /// Column to test (e.g., "year", "source")
    pub column: String,
    /// Required cell value (e.g., "1990", "USA")
    pub value: String,
}

impl RowFilter {
    pub fn new(column: impl Into<String>, value: impl Into<String>) -> Result<Self, DataFormatError> {
        let column = column.into().trim().to_string();
        let value = value.into().trim().to_string();
        if column.is_empty() {
            return Err(DataFormatError::InvalidFilter(format!("={value}")));
        }
        Ok(Self { column, value })
    }

    /// Returns true if the item's cell equals the filter value.
    ///
    /// Rows without the column never match.
    pub fn matches(&self, item: &WorkItem) -> bool {
        item.text(&self.column)
            .is_some_and(|cell| cell.trim().eq_ignore_ascii_case(&self.value))
    }
}

impl fmt::Display for RowFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.column, self.value)
    }
}

impl FromStr for RowFilter {
    type Err = DataFormatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((column, value)) => RowFilter::new(column, value),
            None => Err(DataFormatError::InvalidFilter(s.to_string())),
        }
    }
}

/// Parse filters given as separate `column=value` strings.
pub fn parse_filters<S: AsRef<str>>(raw: &[S]) -> Result<Vec<RowFilter>, DataFormatError> {
    raw.iter()
        .map(|s| s.as_ref().trim())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
