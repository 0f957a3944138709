use anyhow::{Context, Result};
use clap::Args;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::cli::output::get_formatter;
use crate::models::{Config, ExtractorKind, OutputFormat};
use crate::services::{ExportFormat, JsonlStore, build_extractor, reextract_records, write_records};

#[derive(Debug, Args)]
pub struct ExtractArgs {
    /// File with one raw response, or - for stdin
    #[arg(value_name = "FILE", conflicts_with = "records")]
    pub input: Option<PathBuf>,

    /// Extractor to run, overriding the configured one
    #[arg(long, short = 'x')]
    pub extractor: Option<ExtractorKind>,

    /// Re-extract every record's stored response in this JSONL file
    #[arg(long, requires = "out")]
    pub records: Option<PathBuf>,

    /// Where re-extracted records are written
    #[arg(long, requires = "records")]
    pub out: Option<PathBuf>,
}

fn read_input(input: Option<&Path>) -> Result<String> {
    match input {
        None => read_stdin(),
        Some(path) if path == Path::new("-") => read_stdin(),
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
    }
}

fn read_stdin() -> Result<String> {
    let mut buf = String::new();
    std::io::stdin()
        .read_to_string(&mut buf)
        .context("failed to read stdin")?;
    Ok(buf)
}

pub async fn handle_extract(
    args: ExtractArgs,
    config: Config,
    format: OutputFormat,
    _verbose: bool,
) -> Result<()> {
    let formatter = get_formatter(format);
    let kind = args.extractor.unwrap_or(config.prompt.extractor);
    let extractor = build_extractor(kind, &config.prompt);

    if let (Some(records_path), Some(out)) = (&args.records, &args.out) {
        let mut records = JsonlStore::read_checkpoint(records_path)
            .with_context(|| format!("failed to read records from {}", records_path.display()))?;
        let stats = reextract_records(&mut records, extractor.as_ref());
        write_records(&records, out, ExportFormat::from_path(out))
            .with_context(|| format!("failed to write {}", out.display()))?;
        print!("{}", formatter.format_reextract(&stats, out));
        return Ok(());
    }

    let raw = read_input(args.input.as_deref())?;
    let parsed = extractor
        .parse(&raw)
        .with_context(|| format!("{} extractor found no output", kind))?;
    print!("{}", formatter.format_parsed(&parsed));

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WorkError;
    use crate::models::{Fields, RunRecord, WorkItem, WorkOutput};

    fn item(row: u64) -> WorkItem {
        WorkItem::new(row, Fields::new())
    }

    #[tokio::test]
    async fn test_extract_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("response.txt");
        std::fs::write(
            &path,
            "Reasoning here.\n\nOutput: The UK is portrayed as a close ally.",
        )
        .unwrap();

        let args = ExtractArgs {
            input: Some(path),
            extractor: None,
            records: None,
            out: None,
        };
        handle_extract(args, Config::default(), OutputFormat::Text, false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_extract_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("response.txt");
        std::fs::write(&path, "no marker anywhere").unwrap();

        let args = ExtractArgs {
            input: Some(path),
            extractor: Some(ExtractorKind::Marker),
            records: None,
            out: None,
        };
        let result = handle_extract(args, Config::default(), OutputFormat::Text, false).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_reextract_recovers_unparseable_records() {
        let dir = tempfile::tempdir().unwrap();
        let records_path = dir.path().join("results.jsonl");
        let failed = RunRecord::failure(
            &item(1),
            &WorkError::Unparseable {
                response: "{\"label\": \"ally\"}".into(),
                reason: "no marker".into(),
            },
            1,
        );
        let ok = RunRecord::success(&item(2), WorkOutput::new("{\"label\": \"rival\"}"), 1);
        write_records(&[failed, ok], &records_path, ExportFormat::Jsonl).unwrap();

        let out = dir.path().join("reparsed.jsonl");
        let args = ExtractArgs {
            input: None,
            extractor: Some(ExtractorKind::Json),
            records: Some(records_path),
            out: Some(out.clone()),
        };
        handle_extract(args, Config::default(), OutputFormat::Json, false)
            .await
            .unwrap();

        let records = JsonlStore::read_checkpoint(&out).unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.is_success()));
        assert_eq!(records[0].extracted_fields["label"], "ally");
        assert!(records.iter().all(|r| r.error.is_none()));
    }
}
