use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::cli::output::{FailedRow, StatusInfo, get_formatter};
use crate::models::{Config, ErrorKind, OutputFormat, RunRecord};
use crate::services::{DatasetLoader, JsonlStore, OutputStore, RunManifest};

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Directory holding results.jsonl and checkpoints
    #[arg(long, short = 'o')]
    pub output_dir: PathBuf,

    /// Dataset to count pending rows against
    #[arg(long, short = 'i')]
    pub input: Option<PathBuf>,
}

const KIND_ORDER: [ErrorKind; 4] = [
    ErrorKind::RateLimited,
    ErrorKind::Transient,
    ErrorKind::Permanent,
    ErrorKind::Unparseable,
];

fn failures_by_kind(records: &[RunRecord]) -> Vec<(ErrorKind, u64)> {
    KIND_ORDER
        .iter()
        .filter_map(|&kind| {
            let count = records
                .iter()
                .filter(|r| r.error.as_ref().is_some_and(|e| e.kind == kind))
                .count() as u64;
            (count > 0).then_some((kind, count))
        })
        .collect()
}

pub async fn handle_status(
    args: StatusArgs,
    config: Config,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);

    if !args.output_dir.exists() {
        anyhow::bail!("output directory not found: {}", args.output_dir.display());
    }

    let store = JsonlStore::open_read_only(&args.output_dir);
    let records = store.load_records().context("failed to read stored results")?;
    let checkpoints = store.list_checkpoints()?;
    let manifest = RunManifest::load(&args.output_dir)?;

    let pending = match args.input {
        Some(ref input) => {
            let dataset = DatasetLoader::from_config(&config.dataset)?
                .load(input)
                .with_context(|| format!("failed to load dataset {}", input.display()))?;
            let done = store.load_processed_ids()?;
            Some(
                dataset
                    .items
                    .iter()
                    .filter(|item| !done.contains(&item.row()))
                    .count() as u64,
            )
        }
        None => None,
    };

    let succeeded = records.iter().filter(|r| r.is_success()).count() as u64;
    let failed_rows = if verbose {
        records
            .iter()
            .filter_map(|r| {
                r.error.as_ref().map(|e| FailedRow {
                    row: r.row,
                    kind: e.kind,
                    message: e.message.clone(),
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    let status = StatusInfo {
        output_dir: args.output_dir.clone(),
        records: records.len() as u64,
        succeeded,
        failed: records.len() as u64 - succeeded,
        failures_by_kind: failures_by_kind(&records),
        checkpoints: checkpoints.len() as u64,
        latest_checkpoint: checkpoints.last().map(|(_, path)| path.clone()),
        pending,
        manifest,
        failed_rows,
    };

    print!("{}", formatter.format_status(&status));

    if status.pending.is_some_and(|n| n > 0) {
        eprintln!();
        eprintln!(
            "Hint: resume with: rebatch run --input <dataset> --output-dir {}",
            args.output_dir.display()
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkError;
    use crate::models::{Fields, WorkItem, WorkOutput};

    fn item(row: u64) -> WorkItem {
        WorkItem::new(row, Fields::new())
    }

    #[test]
    fn test_failures_grouped_in_fixed_order() {
        let records = vec![
            RunRecord::success(&item(1), WorkOutput::new("ok"), 1),
            RunRecord::failure(&item(2), &WorkError::Permanent("bad".into()), 1),
            RunRecord::failure(&item(3), &WorkError::Transient("flaky".into()), 4),
            RunRecord::failure(&item(4), &WorkError::Permanent("bad".into()), 1),
        ];
        assert_eq!(
            failures_by_kind(&records),
            vec![(ErrorKind::Transient, 1), (ErrorKind::Permanent, 2)]
        );
    }

    #[tokio::test]
    async fn test_missing_output_dir_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let args = StatusArgs {
            output_dir: dir.path().join("nope"),
            input: None,
        };
        let result = handle_status(args, Config::default(), OutputFormat::Json, false).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_status_counts_pending_rows() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("rows.jsonl");
        std::fs::write(&input, "{\"text\":\"a\"}\n{\"text\":\"b\"}\n{\"text\":\"c\"}\n").unwrap();
        let out = dir.path().join("out");

        let mut store = JsonlStore::open(&out).unwrap();
        store
            .append(&RunRecord::success(&item(1), WorkOutput::new("ok"), 1))
            .unwrap();

        let args = StatusArgs {
            output_dir: out,
            input: Some(input),
        };
        handle_status(args, Config::default(), OutputFormat::Json, true)
            .await
            .unwrap();
    }
}
