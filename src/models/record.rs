//! Result records: the persisted outcome of one work item.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::item::{Fields, RowId, WorkItem};
use crate::error::WorkError;

/// Whether the unit of work produced a usable answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Success,
    Failed,
}

/// Failure classification stored on a failed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    RateLimited,
    Transient,
    Permanent,
    Unparseable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::RateLimited => write!(f, "rate_limited"),
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Permanent => write!(f, "permanent"),
            ErrorKind::Unparseable => write!(f, "unparseable"),
        }
    }
}

/// Error marker kept on a failed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMarker {
    pub kind: ErrorKind,
    pub message: String,
}

/// What a unit of work returns on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkOutput {
    /// Raw response text.
    pub response: String,
    /// Parsed answer, if the task extracts one.
    pub extracted_output: Option<String>,
    /// Structured sub-fields, if the task extracts any.
    pub extracted_fields: Fields,
}

impl WorkOutput {
    pub fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_extracted(mut self, output: impl Into<String>) -> Self {
        self.extracted_output = Some(output.into());
        self
    }

    #[must_use]
    pub fn with_fields(mut self, fields: Fields) -> Self {
        self.extracted_fields = fields;
        self
    }
}

/// One line of the output store.
///
/// Serialized as a flat JSON object: `row`, the original dataset columns,
/// then the derived fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub row: RowId,

    #[serde(flatten)]
    pub fields: Fields,

    pub status: RecordStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_output: Option<String>,

    #[serde(default, skip_serializing_if = "Fields::is_empty")]
    pub extracted_fields: Fields,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorMarker>,

    #[serde(default)]
    pub attempts: u32,

    pub completed_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn success(item: &WorkItem, output: WorkOutput, attempts: u32) -> Self {
        Self {
            row: item.row(),
            fields: item.fields().clone(),
            status: RecordStatus::Success,
            response: Some(output.response),
            extracted_output: output.extracted_output,
            extracted_fields: output.extracted_fields,
            error: None,
            attempts,
            completed_at: Utc::now(),
        }
    }

    pub fn failure(item: &WorkItem, error: &WorkError, attempts: u32) -> Self {
        Self {
            row: item.row(),
            fields: item.fields().clone(),
            status: RecordStatus::Failed,
            response: error.response().map(String::from),
            extracted_output: None,
            extracted_fields: Fields::new(),
            error: Some(ErrorMarker {
                kind: error.kind(),
                message: error.to_string(),
            }),
            attempts,
            completed_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RecordStatus::Success
    }
}
