use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::models::{ErrorKind, OutputFormat, RowId, RunSummary};
use crate::services::{ExportReport, ParsedOutput, ReextractStats, RunManifest};

pub trait Formatter {
    fn format_run_summary(&self, run: &RunInfo) -> String;
    fn format_dry_run(&self, info: &DryRunInfo) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_export(&self, report: &ExportReport) -> String;
    fn format_parsed(&self, parsed: &ParsedOutput) -> String;
    fn format_reextract(&self, stats: &ReextractStats, out: &Path) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone, Serialize)]
pub struct RunInfo {
    pub dataset: PathBuf,
    pub output_dir: PathBuf,
    #[serde(flatten)]
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct DryRunInfo {
    pub dataset: PathBuf,
    pub rows_read: u64,
    pub rows_selected: u64,
    pub rows_done: u64,
    pub rows_pending: u64,
    pub columns: Vec<String>,
    pub placeholders: Vec<String>,
    /// Prompt rendered from the first pending row.
    pub sample_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedRow {
    pub row: RowId,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusInfo {
    pub output_dir: PathBuf,
    pub records: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub failures_by_kind: Vec<(ErrorKind, u64)>,
    pub checkpoints: u64,
    pub latest_checkpoint: Option<PathBuf>,
    /// Rows of the dataset still without a result, when a dataset was given.
    pub pending: Option<u64>,
    pub manifest: Option<RunManifest>,
    /// Filled only in verbose mode.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed_rows: Vec<FailedRow>,
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_run_summary(&self, run: &RunInfo) -> String {
        let s = &run.summary;
        let mut output = String::new();
        writeln!(output, "Run Complete").unwrap();
        writeln!(output, "------------").unwrap();
        writeln!(output, "Dataset:        {}", run.dataset.display()).unwrap();
        writeln!(output, "Output:         {}", run.output_dir.display()).unwrap();
        writeln!(output, "Rows total:     {}", s.rows_total).unwrap();
        writeln!(output, "Already done:   {}", s.rows_skipped_already_done).unwrap();
        writeln!(output, "Processed:      {}", s.rows_processed).unwrap();
        writeln!(
            output,
            "  Succeeded:    {} ({:.1}%)",
            s.rows_succeeded,
            s.success_rate()
        )
        .unwrap();
        writeln!(output, "  Failed:       {}", s.rows_failed).unwrap();
        writeln!(output, "Batches:        {}", s.batches).unwrap();
        writeln!(output, "Checkpoints:    {}", s.checkpoints_written).unwrap();
        writeln!(output, "Duration:       {}ms", s.duration_ms).unwrap();
        output
    }

    fn format_dry_run(&self, info: &DryRunInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Dry Run").unwrap();
        writeln!(output, "-------").unwrap();
        writeln!(output, "Dataset:        {}", info.dataset.display()).unwrap();
        writeln!(output, "Rows read:      {}", info.rows_read).unwrap();
        writeln!(output, "Rows selected:  {}", info.rows_selected).unwrap();
        writeln!(output, "Already done:   {}", info.rows_done).unwrap();
        writeln!(output, "Pending:        {}", info.rows_pending).unwrap();
        writeln!(output, "Columns:        {}", info.columns.join(", ")).unwrap();
        writeln!(output, "Placeholders:   {}", info.placeholders.join(", ")).unwrap();
        if let Some(ref prompt) = info.sample_prompt {
            writeln!(output, "\nSample prompt:").unwrap();
            writeln!(output, "   ---").unwrap();
            for line in prompt.lines() {
                writeln!(output, "   {}", line).unwrap();
            }
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();
        writeln!(output, "Output:         {}", status.output_dir.display()).unwrap();
        writeln!(output, "Records:        {}", status.records).unwrap();
        writeln!(output, "  Succeeded:    {}", status.succeeded).unwrap();
        writeln!(output, "  Failed:       {}", status.failed).unwrap();
        for (kind, count) in &status.failures_by_kind {
            writeln!(output, "    {:<12}{}", kind.to_string(), count).unwrap();
        }
        if let Some(pending) = status.pending {
            writeln!(output, "Pending:        {}", pending).unwrap();
        }
        writeln!(output, "Checkpoints:    {}", status.checkpoints).unwrap();
        if let Some(ref path) = status.latest_checkpoint {
            writeln!(output, "  Latest:       {}", path.display()).unwrap();
        }
        if let Some(ref m) = status.manifest {
            writeln!(output, "Dataset:        {}", m.dataset.display()).unwrap();
            writeln!(output, "  SHA-256:      {}", m.dataset_sha256).unwrap();
            writeln!(output, "  Runs:         {}", m.runs).unwrap();
            writeln!(output, "  Updated:      {}", m.updated_at.to_rfc3339()).unwrap();
        }
        if !status.failed_rows.is_empty() {
            writeln!(output, "\nFailed rows:").unwrap();
            for f in &status.failed_rows {
                writeln!(output, "  {:>6}  [{}] {}", f.row.0, f.kind, f.message).unwrap();
            }
        }
        output
    }

    fn format_export(&self, report: &ExportReport) -> String {
        let mut output = String::new();
        writeln!(output, "Export Complete").unwrap();
        writeln!(output, "---------------").unwrap();
        writeln!(output, "File:      {}", report.path.display()).unwrap();
        writeln!(output, "Format:    {}", report.format).unwrap();
        writeln!(output, "Records:   {}", report.records).unwrap();
        writeln!(output, "Succeeded: {}", report.succeeded).unwrap();
        writeln!(output, "Failed:    {}", report.failed).unwrap();
        output
    }

    fn format_parsed(&self, parsed: &ParsedOutput) -> String {
        let mut output = String::new();
        writeln!(output, "{}", parsed.text).unwrap();
        for (key, value) in &parsed.fields {
            writeln!(output, "  {}: {}", key, value).unwrap();
        }
        output
    }

    fn format_reextract(&self, stats: &ReextractStats, out: &Path) -> String {
        let mut output = String::new();
        writeln!(output, "Re-extraction Complete").unwrap();
        writeln!(output, "----------------------").unwrap();
        writeln!(output, "File:        {}", out.display()).unwrap();
        writeln!(output, "Records:     {}", stats.records).unwrap();
        writeln!(output, "Parsed:      {}", stats.parsed).unwrap();
        writeln!(output, "Recovered:   {}", stats.recovered).unwrap();
        writeln!(output, "Unparseable: {}", stats.unparseable).unwrap();
        writeln!(output, "No response: {}", stats.skipped).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render<T: Serialize>(&self, value: &T) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        let mut text = rendered.unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e));
        text.push('\n');
        text
    }
}

impl Formatter for JsonFormatter {
    fn format_run_summary(&self, run: &RunInfo) -> String {
        self.render(run)
    }

    fn format_dry_run(&self, info: &DryRunInfo) -> String {
        self.render(info)
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let failures: serde_json::Map<String, serde_json::Value> = status
            .failures_by_kind
            .iter()
            .map(|(kind, count)| (kind.to_string(), serde_json::json!(count)))
            .collect();

        let json = serde_json::json!({
            "output_dir": status.output_dir,
            "records": status.records,
            "succeeded": status.succeeded,
            "failed": status.failed,
            "failures_by_kind": failures,
            "pending": status.pending,
            "checkpoints": {
                "count": status.checkpoints,
                "latest": status.latest_checkpoint,
            },
            "manifest": status.manifest,
            "failed_rows": status.failed_rows,
        });
        self.render(&json)
    }

    fn format_export(&self, report: &ExportReport) -> String {
        self.render(report)
    }

    fn format_parsed(&self, parsed: &ParsedOutput) -> String {
        self.render(&serde_json::json!({
            "extracted_output": parsed.text,
            "extracted_fields": parsed.fields,
        }))
    }

    fn format_reextract(&self, stats: &ReextractStats, out: &Path) -> String {
        self.render(&serde_json::json!({
            "path": out,
            "stats": stats,
        }))
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string()
    }

    fn format_error(&self, error: &str) -> String {
        format!("{}\n", serde_json::json!({"error": error}))
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_run_summary(&self, run: &RunInfo) -> String {
        let s = &run.summary;
        let mut output = String::new();
        writeln!(output, "## Run Complete\n").unwrap();
        writeln!(output, "**Dataset:** `{}`\n", run.dataset.display()).unwrap();
        writeln!(output, "**Output:** `{}`\n", run.output_dir.display()).unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Rows total | {} |", s.rows_total).unwrap();
        writeln!(output, "| Already done | {} |", s.rows_skipped_already_done).unwrap();
        writeln!(output, "| Processed | {} |", s.rows_processed).unwrap();
        writeln!(output, "| Succeeded | {} |", s.rows_succeeded).unwrap();
        writeln!(output, "| Failed | {} |", s.rows_failed).unwrap();
        writeln!(output, "| Success rate | {:.1}% |", s.success_rate()).unwrap();
        writeln!(output, "| Batches | {} |", s.batches).unwrap();
        writeln!(output, "| Checkpoints | {} |", s.checkpoints_written).unwrap();
        writeln!(output, "| Duration | {}ms |", s.duration_ms).unwrap();
        output
    }

    fn format_dry_run(&self, info: &DryRunInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Dry Run\n").unwrap();
        writeln!(output, "**Dataset:** `{}`\n", info.dataset.display()).unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Rows read | {} |", info.rows_read).unwrap();
        writeln!(output, "| Rows selected | {} |", info.rows_selected).unwrap();
        writeln!(output, "| Already done | {} |", info.rows_done).unwrap();
        writeln!(output, "| Pending | {} |", info.rows_pending).unwrap();
        let columns: Vec<String> = info.columns.iter().map(|c| format!("`{}`", c)).collect();
        writeln!(output, "\n**Columns:** {}\n", columns.join(", ")).unwrap();
        if let Some(ref prompt) = info.sample_prompt {
            writeln!(output, "### Sample prompt\n").unwrap();
            writeln!(output, "```").unwrap();
            writeln!(output, "{}", prompt).unwrap();
            writeln!(output, "```").unwrap();
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();
        writeln!(output, "**Output:** `{}`\n", status.output_dir.display()).unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Records | {} |", status.records).unwrap();
        writeln!(output, "| Succeeded | {} |", status.succeeded).unwrap();
        writeln!(output, "| Failed | {} |", status.failed).unwrap();
        for (kind, count) in &status.failures_by_kind {
            writeln!(output, "| Failed ({}) | {} |", kind, count).unwrap();
        }
        if let Some(pending) = status.pending {
            writeln!(output, "| Pending | {} |", pending).unwrap();
        }
        writeln!(output, "| Checkpoints | {} |", status.checkpoints).unwrap();
        if let Some(ref path) = status.latest_checkpoint {
            writeln!(output, "\n**Latest checkpoint:** `{}`", path.display()).unwrap();
        }
        if let Some(ref m) = status.manifest {
            writeln!(
                output,
                "\n**Dataset:** `{}` (sha256 `{}`, {} runs)",
                m.dataset.display(),
                m.dataset_sha256,
                m.runs
            )
            .unwrap();
        }
        if !status.failed_rows.is_empty() {
            writeln!(output, "\n### Failed rows\n").unwrap();
            writeln!(output, "| Row | Kind | Message |").unwrap();
            writeln!(output, "|-----|------|---------|").unwrap();
            for f in &status.failed_rows {
                writeln!(
                    output,
                    "| {} | {} | {} |",
                    f.row,
                    f.kind,
                    f.message.replace('|', "\\|")
                )
                .unwrap();
            }
        }
        output
    }

    fn format_export(&self, report: &ExportReport) -> String {
        let mut output = String::new();
        writeln!(output, "## Export Complete\n").unwrap();
        writeln!(output, "- **File:** `{}`", report.path.display()).unwrap();
        writeln!(output, "- **Format:** {}", report.format).unwrap();
        writeln!(output, "- **Records:** {}", report.records).unwrap();
        writeln!(output, "- **Succeeded:** {}", report.succeeded).unwrap();
        writeln!(output, "- **Failed:** {}", report.failed).unwrap();
        output
    }

    fn format_parsed(&self, parsed: &ParsedOutput) -> String {
        let mut output = String::new();
        writeln!(output, "> {}", parsed.text).unwrap();
        if !parsed.fields.is_empty() {
            writeln!(output).unwrap();
            for (key, value) in &parsed.fields {
                writeln!(output, "- **{}:** {}", key, value).unwrap();
            }
        }
        output
    }

    fn format_reextract(&self, stats: &ReextractStats, out: &Path) -> String {
        let mut output = String::new();
        writeln!(output, "## Re-extraction Complete\n").unwrap();
        writeln!(output, "**File:** `{}`\n", out.display()).unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Records | {} |", stats.records).unwrap();
        writeln!(output, "| Parsed | {} |", stats.parsed).unwrap();
        writeln!(output, "| Recovered | {} |", stats.recovered).unwrap();
        writeln!(output, "| Unparseable | {} |", stats.unparseable).unwrap();
        writeln!(output, "| No response | {} |", stats.skipped).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
