use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::cli::output::get_formatter;
use crate::models::OutputFormat;
use crate::services::{ExportFilter, ExportFormat, JsonlStore, export_store};

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// Directory holding results.jsonl and checkpoints
    #[arg(long, short = 'o')]
    pub output_dir: PathBuf,

    /// Destination file; .csv selects CSV output
    #[arg(long)]
    pub out: PathBuf,

    /// Write CSV regardless of the destination extension
    #[arg(long)]
    pub csv: bool,

    /// Export only failed rows
    #[arg(long, conflicts_with = "succeeded_only")]
    pub failed_only: bool,

    /// Export only successful rows
    #[arg(long)]
    pub succeeded_only: bool,
}

impl ExportArgs {
    fn export_format(&self) -> ExportFormat {
        if self.csv {
            ExportFormat::Csv
        } else {
            ExportFormat::from_path(&self.out)
        }
    }

    fn filter(&self) -> ExportFilter {
        if self.failed_only {
            ExportFilter::Failed
        } else if self.succeeded_only {
            ExportFilter::Succeeded
        } else {
            ExportFilter::All
        }
    }
}

pub async fn handle_export(args: ExportArgs, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    if !args.output_dir.exists() {
        anyhow::bail!("output directory not found: {}", args.output_dir.display());
    }

    let store = JsonlStore::open_read_only(&args.output_dir);
    let report = export_store(&store, &args.out, args.export_format(), args.filter())
        .with_context(|| format!("failed to export to {}", args.out.display()))?;

    print!("{}", formatter.format_export(&report));

    if report.records == 0 {
        eprintln!("\nWarning: no records matched; wrote an empty file.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkError;
    use crate::models::{Fields, RunRecord, WorkItem, WorkOutput};
    use crate::services::OutputStore;

    fn item(row: u64) -> WorkItem {
        WorkItem::new(row, Fields::new())
    }

    fn args(out: PathBuf) -> ExportArgs {
        ExportArgs {
            output_dir: PathBuf::new(),
            out,
            csv: false,
            failed_only: false,
            succeeded_only: false,
        }
    }

    #[test]
    fn test_format_follows_extension_unless_forced() {
        assert_eq!(args("a.jsonl".into()).export_format(), ExportFormat::Jsonl);
        assert_eq!(args("a.csv".into()).export_format(), ExportFormat::Csv);

        let mut forced = args("a.txt".into());
        forced.csv = true;
        assert_eq!(forced.export_format(), ExportFormat::Csv);
    }

    #[test]
    fn test_filter_flags() {
        let mut a = args("a.jsonl".into());
        assert_eq!(a.filter(), ExportFilter::All);
        a.failed_only = true;
        assert_eq!(a.filter(), ExportFilter::Failed);
        a.failed_only = false;
        a.succeeded_only = true;
        assert_eq!(a.filter(), ExportFilter::Succeeded);
    }

    #[tokio::test]
    async fn test_export_failed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let out_dir = dir.path().join("out");
        let mut store = JsonlStore::open(&out_dir).unwrap();
        store
            .append(&RunRecord::success(&item(1), WorkOutput::new("ok"), 1))
            .unwrap();
        store
            .append(&RunRecord::failure(
                &item(2),
                &WorkError::Permanent("bad request".into()),
                1,
            ))
            .unwrap();

        let dest = dir.path().join("failed.jsonl");
        let mut a = args(dest.clone());
        a.output_dir = out_dir;
        a.failed_only = true;
        handle_export(a, OutputFormat::Json, false).await.unwrap();

        let content = std::fs::read_to_string(&dest).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\"row\":2"));
    }
}
