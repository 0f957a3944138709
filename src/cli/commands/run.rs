//! Run command implementation.

use anyhow::{Context, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

use crate::cli::output::{DryRunInfo, RunInfo, get_formatter};
use crate::models::{
    BatchReport, CheckpointInfo, Config, DEFAULT_TEMPLATE, DatasetFormat, ExtractorKind,
    LlmProvider, OutputFormat, PromptConfig, RunRecord,
};
use crate::services::{
    BatchProcessor, ChatClient, DatasetLoader, FingerprintCheck, JsonlStore, OutputStore,
    ProcessorConfig, PromptTask, PromptTemplate, RunObserver, build_extractor, check_dataset,
    record_run,
};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Dataset file (.csv, .jsonl or .ndjson)
    #[arg(long, short = 'i')]
    pub input: PathBuf,

    /// Directory holding results.jsonl and checkpoints
    #[arg(long, short = 'o')]
    pub output_dir: PathBuf,

    /// Dataset format, overriding the file extension
    #[arg(long)]
    pub input_format: Option<DatasetFormat>,

    /// Columns kept on each row (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub columns: Vec<String>,

    /// Row filter in the format column=value (can be specified multiple times)
    #[arg(long = "where", value_name = "COLUMN=VALUE")]
    pub filters: Vec<String>,

    /// Rows per batch
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Rows between checkpoints
    #[arg(long)]
    pub checkpoint_every: Option<usize>,

    /// Retries for rate-limited or transient failures
    #[arg(long)]
    pub max_retries: Option<u32>,

    /// Prompt template file with {column} placeholders
    #[arg(long, short = 't')]
    pub template_file: Option<PathBuf>,

    /// Response extractor: marker, json, or none
    #[arg(long, short = 'x')]
    pub extractor: Option<ExtractorKind>,

    /// Chat API provider: cohere or openai
    #[arg(long)]
    pub provider: Option<LlmProvider>,

    /// Model name
    #[arg(long, short = 'm')]
    pub model: Option<String>,

    /// Validate the dataset and template and report pending rows without calling the API
    #[arg(long)]
    pub dry_run: bool,
}

impl RunArgs {
    /// Layer command-line flags over the loaded config.
    fn apply(&self, config: &mut Config) {
        if let Some(format) = self.input_format {
            config.dataset.format = Some(format);
        }
        if !self.columns.is_empty() {
            config.dataset.columns = self.columns.clone();
        }
        if !self.filters.is_empty() {
            config.dataset.filters = self.filters.clone();
        }
        if let Some(n) = self.batch_size {
            config.processing.batch_size = n;
        }
        if let Some(n) = self.checkpoint_every {
            config.processing.checkpoint_every = n;
        }
        if let Some(n) = self.max_retries {
            config.retry.max_retries = n;
        }
        if let Some(ref path) = self.template_file {
            config.prompt.template_file = Some(path.clone());
            config.prompt.template = None;
        }
        if let Some(kind) = self.extractor {
            config.prompt.extractor = kind;
        }
        if let Some(provider) = self.provider {
            if provider != config.llm.provider {
                // Provider-specific defaults follow the new provider.
                config.llm.base_url = None;
                config.llm.api_key_env = None;
            }
            config.llm.provider = provider;
        }
        if let Some(ref model) = self.model {
            config.llm.model = model.clone();
        }
    }
}

pub(crate) fn load_template(prompt: &PromptConfig) -> Result<PromptTemplate> {
    let template = match (&prompt.template_file, &prompt.template) {
        (Some(path), _) => PromptTemplate::from_file(path)?,
        (None, Some(inline)) => PromptTemplate::parse(inline).context("invalid inline template")?,
        (None, None) => PromptTemplate::parse(DEFAULT_TEMPLATE)?,
    };
    Ok(template)
}

/// Drives a progress bar from processor events.
struct ProgressObserver {
    pb: ProgressBar,
    verbose: bool,
}

impl ProgressObserver {
    fn new(hidden: bool, verbose: bool) -> Result<Self> {
        let pb = if hidden {
            ProgressBar::hidden()
        } else {
            ProgressBar::new(0)
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
                )?
                .progress_chars("#>-"),
        );
        Ok(Self { pb, verbose })
    }
}

impl RunObserver for ProgressObserver {
    fn on_start(&mut self, pending: u64, skipped: u64) {
        self.pb.set_length(pending);
        if skipped > 0 {
            self.pb
                .println(format!("Resuming: {} rows already done", skipped));
        }
    }

    fn on_record(&mut self, record: &RunRecord) {
        self.pb.inc(1);
        if self.verbose
            && let Some(ref error) = record.error
        {
            self.pb
                .println(format!("  row {}: [{}] {}", record.row, error.kind, error.message));
        }
    }

    fn on_batch(&mut self, report: &BatchReport) {
        self.pb.set_message(format!(
            "batch {}/{} ({:.1}% ok)",
            report.batch,
            report.total_batches,
            report.success_rate()
        ));
    }

    fn on_checkpoint(&mut self, checkpoint: &CheckpointInfo) {
        if self.verbose {
            self.pb.println(format!(
                "  checkpoint {} ({} records)",
                checkpoint.sequence, checkpoint.records
            ));
        }
    }
}

pub async fn handle_run(
    args: RunArgs,
    mut config: Config,
    format: OutputFormat,
    verbose: bool,
    cancel: CancellationToken,
) -> Result<()> {
    let formatter = get_formatter(format);
    args.apply(&mut config);
    config.validate().context("invalid configuration")?;

    let template = load_template(&config.prompt)?;
    let dataset = DatasetLoader::from_config(&config.dataset)?
        .load(&args.input)
        .with_context(|| format!("failed to load dataset {}", args.input.display()))?;
    template
        .validate(&dataset.columns)
        .context("template does not match the dataset columns")?;

    if dataset.items.is_empty() {
        println!("{}", formatter.format_message("No rows matched the dataset filters."));
        return Ok(());
    }

    if args.dry_run {
        if let FingerprintCheck::Changed { .. } = check_dataset(&args.output_dir, &args.input)? {
            eprintln!("Warning: dataset changed since the last run; row ids may not line up.");
        }
        let done = JsonlStore::open_read_only(&args.output_dir).load_processed_ids()?;
        let pending: Vec<_> = dataset
            .items
            .iter()
            .filter(|item| !done.contains(&item.row()))
            .collect();
        let sample_prompt = match pending.first() {
            Some(item) => Some(template.render(item)?),
            None => None,
        };

        let info = DryRunInfo {
            dataset: args.input.clone(),
            rows_read: dataset.rows_read,
            rows_selected: dataset.items.len() as u64,
            rows_done: (dataset.items.len() - pending.len()) as u64,
            rows_pending: pending.len() as u64,
            columns: dataset.columns.clone(),
            placeholders: template.placeholders().iter().map(|s| s.to_string()).collect(),
            sample_prompt,
        };
        print!("{}", formatter.format_dry_run(&info));
        return Ok(());
    }

    let client = ChatClient::new(&config.llm).context("failed to create chat client")?;
    let extractor = build_extractor(config.prompt.extractor, &config.prompt);
    let task = PromptTask::new(template, client, extractor);

    let processor = BatchProcessor::new(ProcessorConfig::from_settings(
        &config.processing,
        &config.retry,
    ))?
    .with_cancellation(cancel);

    let mut store = JsonlStore::open(&args.output_dir)
        .with_context(|| format!("failed to open output directory {}", args.output_dir.display()))?;
    let (_, check) = record_run(&args.output_dir, &args.input, dataset.rows_read)?;
    if let FingerprintCheck::Changed { .. } = check {
        eprintln!("Warning: dataset changed since the last run; row ids may not line up.");
    }

    tracing::info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        extractor = %config.prompt.extractor,
        output = %args.output_dir.display(),
        "starting processor"
    );

    let mut observer = ProgressObserver::new(format == OutputFormat::Json, verbose)?;
    let result = processor
        .run_with_observer(&dataset.items, &task, &mut store, &mut observer)
        .await;
    observer.pb.finish_and_clear();

    let summary = result.context("run aborted; rerun the same command to resume")?;
    let info = RunInfo {
        dataset: args.input,
        output_dir: args.output_dir,
        summary,
    };
    print!("{}", formatter.format_run_summary(&info));

    if info.summary.rows_failed > 0 {
        eprintln!(
            "\nHint: inspect failed rows with: rebatch status --output-dir {} -v",
            info.output_dir.display()
        );
    }

    Ok(())
}
