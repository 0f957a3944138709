//! Output store: append log plus numbered checkpoint snapshots.

use chrono::Utc;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::models::{CheckpointInfo, RowId, RunRecord};
use crate::utils::file::write_atomic;

pub const RESULTS_FILE: &str = "results.jsonl";
pub const CHECKPOINT_DIR: &str = "checkpoints";
const CHECKPOINT_PREFIX: &str = "checkpoint_";
const CHECKPOINT_EXT: &str = ".jsonl";

/// Where a run persists its results. Single writer, single process.
pub trait OutputStore {
    /// All previously persisted records, one per row id, in completion order.
    fn load_records(&self) -> Result<Vec<RunRecord>, StoreError>;

    /// Row ids that already have a record.
    fn load_processed_ids(&self) -> Result<HashSet<RowId>, StoreError> {
        Ok(self.load_records()?.iter().map(|r| r.row).collect())
    }

    /// Durably append one record.
    fn append(&mut self, record: &RunRecord) -> Result<(), StoreError>;

    /// Write a full snapshot that supersedes earlier checkpoints.
    fn checkpoint(&mut self, records: &[RunRecord]) -> Result<CheckpointInfo, StoreError>;
}

/// Line-delimited JSON store rooted at a run directory.
///
/// ```text
/// <dir>/results.jsonl
/// <dir>/checkpoints/checkpoint_000001_20240501T120000Z.jsonl
/// ```
#[derive(Debug)]
pub struct JsonlStore {
    dir: PathBuf,
    log: Option<File>,
    next_sequence: Option<u64>,
}

impl JsonlStore {
    /// Open (creating if needed) the store in `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        let checkpoints = dir.join(CHECKPOINT_DIR);
        fs::create_dir_all(&checkpoints).map_err(|e| StoreError::io(&checkpoints, e))?;
        Ok(Self::open_read_only(dir))
    }

    /// Open the store in `dir` for reading without creating anything.
    ///
    /// A missing directory reads as an empty store.
    pub fn open_read_only(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            log: None,
            next_sequence: None,
        }
    }

    pub fn results_path(&self) -> PathBuf {
        self.dir.join(RESULTS_FILE)
    }

    pub fn checkpoint_dir(&self) -> PathBuf {
        self.dir.join(CHECKPOINT_DIR)
    }

    /// Checkpoint files sorted by sequence number, oldest first.
    pub fn list_checkpoints(&self) -> Result<Vec<(u64, PathBuf)>, StoreError> {
        let dir = self.checkpoint_dir();
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StoreError::io(&dir, e)),
        };

        let mut checkpoints = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&dir, e))?;
            let name = entry.file_name();
            if let Some(sequence) = parse_checkpoint_sequence(&name.to_string_lossy()) {
                checkpoints.push((sequence, entry.path()));
            }
        }
        checkpoints.sort_by_key(|(sequence, _)| *sequence);
        Ok(checkpoints)
    }

    /// The highest-numbered checkpoint, if any.
    pub fn latest_checkpoint(&self) -> Result<Option<(u64, PathBuf)>, StoreError> {
        Ok(self.list_checkpoints()?.pop())
    }

    /// Records in the append log, in file order.
    pub fn read_log(&self) -> Result<Vec<RunRecord>, StoreError> {
        let path = self.results_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_jsonl(&path, true)
    }

    /// Records in one checkpoint file.
    pub fn read_checkpoint(path: &Path) -> Result<Vec<RunRecord>, StoreError> {
        read_jsonl(path, false)
    }

    fn log_file(&mut self) -> Result<&mut File, StoreError> {
        match self.log {
            Some(ref mut file) => Ok(file),
            None => {
                let path = self.results_path();
                let mut file = OpenOptions::new()
                    .create(true)
                    .read(true)
                    .append(true)
                    .open(&path)
                    .map_err(|e| StoreError::io(&path, e))?;
                repair_tail(&mut file).map_err(|e| StoreError::io(&path, e))?;
                Ok(self.log.insert(file))
            }
        }
    }

    fn next_sequence(&mut self) -> Result<u64, StoreError> {
        let next = match self.next_sequence {
            Some(next) => next,
            None => self.latest_checkpoint()?.map_or(1, |(seq, _)| seq + 1),
        };
        self.next_sequence = Some(next + 1);
        Ok(next)
    }
}

impl OutputStore for JsonlStore {
    fn load_records(&self) -> Result<Vec<RunRecord>, StoreError> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for record in self.read_log()? {
            if seen.insert(record.row) {
                records.push(record);
            }
        }

        if let Some((sequence, path)) = self.latest_checkpoint()? {
            let mut recovered = 0usize;
            for record in Self::read_checkpoint(&path)? {
                if seen.insert(record.row) {
                    records.push(record);
                    recovered += 1;
                }
            }
            if recovered > 0 {
                tracing::warn!(
                    checkpoint = sequence,
                    recovered,
                    "records present in checkpoint but missing from append log"
                );
            }
        }

        tracing::debug!(records = records.len(), dir = %self.dir.display(), "loaded existing results");
        Ok(records)
    }

    fn append(&mut self, record: &RunRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let path = self.results_path();
        let file = self.log_file()?;
        file.write_all(line.as_bytes())
            .and_then(|()| file.sync_data())
            .map_err(|e| StoreError::io(&path, e))
    }

    fn checkpoint(&mut self, records: &[RunRecord]) -> Result<CheckpointInfo, StoreError> {
        let sequence = self.next_sequence()?;
        let written_at = Utc::now();
        let name = format!(
            "{CHECKPOINT_PREFIX}{sequence:06}_{}{CHECKPOINT_EXT}",
            written_at.format("%Y%m%dT%H%M%SZ")
        );
        let path = self.checkpoint_dir().join(name);

        let mut content = String::new();
        for record in records {
            content.push_str(&serde_json::to_string(record)?);
            content.push('\n');
        }
        write_atomic(&path, content.as_bytes()).map_err(|e| StoreError::io(&path, e))?;

        tracing::info!(
            checkpoint = sequence,
            records = records.len(),
            path = %path.display(),
            "checkpoint written"
        );

        Ok(CheckpointInfo {
            path,
            sequence,
            records: records.len() as u64,
            written_at,
        })
    }
}

/// Parse the sequence number out of `checkpoint_000012_<timestamp>.jsonl`.
fn parse_checkpoint_sequence(name: &str) -> Option<u64> {
    let rest = name.strip_prefix(CHECKPOINT_PREFIX)?;
    let rest = rest.strip_suffix(CHECKPOINT_EXT)?;
    let digits = rest.split('_').next()?;
    digits.parse().ok()
}

/// Read a JSONL file of records.
///
/// With `tolerate_torn_tail`, an unparsable final line without a trailing
/// newline (an interrupted append) is dropped instead of failing.
fn read_jsonl(path: &Path, tolerate_torn_tail: bool) -> Result<Vec<RunRecord>, StoreError> {
    let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    let ends_cleanly = content.ends_with('\n');
    let lines: Vec<&str> = content.lines().collect();
    let last = lines.len().saturating_sub(1);

    let mut records = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RunRecord>(line) {
            Ok(record) => records.push(record),
            Err(e) if tolerate_torn_tail && idx == last && !ends_cleanly => {
                tracing::warn!(
                    path = %path.display(),
                    line = idx + 1,
                    error = %e,
                    "ignoring torn final line"
                );
            }
            Err(e) => {
                return Err(StoreError::Corrupt {
                    path: path.to_path_buf(),
                    line: idx + 1,
                    message: e.to_string(),
                });
            }
        }
    }
    Ok(records)
}

/// Make sure the next append starts on a fresh line.
///
/// A complete record missing only its newline is kept and terminated; an
/// unparsable fragment left by an interrupted append is cut off.
fn repair_tail(file: &mut File) -> std::io::Result<()> {
    let mut content = Vec::new();
    file.seek(SeekFrom::Start(0))?;
    file.read_to_end(&mut content)?;
    if content.is_empty() || content.last() == Some(&b'\n') {
        return Ok(());
    }

    let keep = content
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1);
    let tail = &content[keep..];
    if serde_json::from_slice::<RunRecord>(tail).is_ok() {
        file.write_all(b"\n")?;
    } else {
        tracing::warn!(bytes = tail.len(), "truncating torn final line of append log");
        file.set_len(keep as u64)?;
    }
    Ok(())
}
