mod config;
mod filter;
mod format;
mod item;
mod record;
mod summary;

pub use config::{
    CONFIG_FILE_NAME, Config, DEFAULT_COHERE_URL, DEFAULT_MODEL, DEFAULT_OPENAI_URL,
    DEFAULT_TEMPLATE, DatasetConfig, DatasetFormat, ExtractorKind, LlmConfig, LlmProvider,
    ProcessingConfig, PromptConfig, ResolvedConfig,
};
pub use filter::{RowFilter, parse_filters};
pub use format::OutputFormat;
pub use item::{
    ColumnMatch, Fields, RESERVED_FIELDS, RowId, WorkItem, is_reserved, normalize_column,
    resolve_column, value_to_text,
};
pub use record::{ErrorKind, ErrorMarker, RecordStatus, RunRecord, WorkOutput};
pub use summary::{BatchReport, CheckpointInfo, RunSummary};
