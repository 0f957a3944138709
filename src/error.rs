//! Error types for the resumable batch runner.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::ErrorKind;
use crate::utils::retry::Retryable;

/// Errors raised while reading the input dataset. Always fatal to a run.
#[derive(Debug, Error)]
pub enum DataFormatError {
    #[error("failed to read dataset {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("line {line}: {message}")]
    InvalidRow { line: usize, message: String },

    #[error("missing column: {0}")]
    MissingColumn(String),

    #[error("column '{requested}' is ambiguous, matches: {}", candidates.join(", "))]
    AmbiguousColumn {
        requested: String,
        candidates: Vec<String>,
    },

    #[error("column '{0}' collides with a reserved output field")]
    ReservedColumn(String),

    #[error("unsupported dataset format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid filter '{0}', expected column=value")]
    InvalidFilter(String),
}

/// Errors raised by an output store. Always fatal to a run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt record in {path} at line {line}: {message}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.into(),
            source,
        }
    }
}

/// Per-row failure returned by a unit of work.
///
/// These never abort a run; the processor records them on the row's result.
#[derive(Debug, Error)]
pub enum WorkError {
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("permanent failure: {0}")]
    Permanent(String),

    #[error("could not parse response: {reason}")]
    Unparseable { response: String, reason: String },

    #[error("unclassified failure: {0:#}")]
    Other(#[from] anyhow::Error),
}

impl WorkError {
    /// Failure classification recorded on the result.
    pub fn kind(&self) -> ErrorKind {
        match self {
            WorkError::RateLimited { .. } => ErrorKind::RateLimited,
            WorkError::Transient(_) => ErrorKind::Transient,
            WorkError::Unparseable { .. } => ErrorKind::Unparseable,
            WorkError::Permanent(_) | WorkError::Other(_) => ErrorKind::Permanent,
        }
    }

    /// Raw response text, kept when the API answered but parsing failed.
    pub fn response(&self) -> Option<&str> {
        match self {
            WorkError::Unparseable { response, .. } => Some(response),
            _ => None,
        }
    }
}

impl Retryable for WorkError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkError::RateLimited { .. } | WorkError::Transient(_)
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            WorkError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Errors related to the chat API.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("API key not found in environment variable {0}")]
    MissingApiKey(String),

    #[error("failed to connect to LLM API: {0}")]
    ConnectionError(String),

    #[error("LLM request timed out")]
    Timeout,

    #[error("rate limited by LLM API: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    #[error("LLM server error (status {status}): {body}")]
    ServerError { status: u16, body: String },

    #[error("LLM request rejected (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),
}

impl Retryable for LlmError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            LlmError::ConnectionError(_)
                | LlmError::Timeout
                | LlmError::RateLimited { .. }
                | LlmError::ServerError { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            LlmError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<LlmError> for WorkError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited {
                message,
                retry_after,
            } => WorkError::RateLimited {
                message,
                retry_after,
            },
            e @ (LlmError::ConnectionError(_) | LlmError::Timeout | LlmError::ServerError { .. }) => {
                WorkError::Transient(e.to_string())
            }
            e => WorkError::Permanent(e.to_string()),
        }
    }
}

/// Errors from response extractors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("response is empty")]
    Empty,

    #[error("no output marker found")]
    MarkerNotFound,

    #[error("extracted output too short ({len} < {min} chars)")]
    TooShort { len: usize, min: usize },

    #[error("extracted output is a heading, not an answer")]
    HeadingOnly,

    #[error("no JSON object found in response")]
    NoJsonObject,

    #[error("JSON object missing required keys: {}", .0.join(", "))]
    MissingKeys(Vec<String>),
}

/// Errors from prompt templates.
#[derive(Debug, Error)]
pub enum PromptError {
    #[error("unclosed placeholder starting at byte {0}")]
    Unclosed(usize),

    #[error("unmatched '}}' at byte {0}")]
    UnmatchedBrace(usize),

    #[error("empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),

    #[error("row has no value for placeholder {{{0}}}")]
    MissingField(String),

    #[error("failed to read template {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Errors related to configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlParseError(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Fatal errors that abort a processor run.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("no work items to process")]
    EmptyInput,

    #[error("invalid processor configuration: {0}")]
    InvalidConfig(String),

    #[error("output store error: {0}")]
    Store(#[from] StoreError),

    #[error("run interrupted")]
    Interrupted,
}
