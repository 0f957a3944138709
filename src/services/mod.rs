mod analysis;
mod dataset;
mod export;
mod extract;
mod llm;
mod manifest;
mod processor;
mod prompt;
mod store;
mod work;

pub use analysis::PromptTask;
pub use dataset::{DatasetLoader, LoadedDataset};
pub use export::{ExportFilter, ExportFormat, ExportReport, combine, export_store, write_records};
pub use extract::{
    DEFAULT_MIN_OUTPUT_LEN, JsonExtractor, MarkerExtractor, OutputExtractor, ParsedOutput,
    PassthroughExtractor, ReextractStats, build_extractor, reextract_records,
};
pub use llm::{ChatBackend, ChatClient};
pub use manifest::{FingerprintCheck, MANIFEST_FILE, RunManifest, check_dataset, record_run};
pub use processor::{BatchProcessor, NoopObserver, ProcessorConfig, RunObserver};
pub use prompt::PromptTemplate;
pub use store::{CHECKPOINT_DIR, JsonlStore, OutputStore, RESULTS_FILE};
pub use work::UnitOfWork;
