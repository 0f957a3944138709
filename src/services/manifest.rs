//! Run manifest: which dataset an output directory was built from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::utils::file::{calculate_file_checksum, write_atomic};

pub const MANIFEST_FILE: &str = "manifest.json";

/// Dataset fingerprint and run bookkeeping, stored next to the results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub dataset: PathBuf,
    pub dataset_sha256: String,
    /// Data rows in the dataset file, before filtering.
    pub rows: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub runs: u64,
}

/// How the current dataset compares to the one recorded earlier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FingerprintCheck {
    /// No manifest existed.
    New,
    Unchanged,
    Changed { previous: String, current: String },
}

impl RunManifest {
    pub fn path(dir: &Path) -> PathBuf {
        dir.join(MANIFEST_FILE)
    }

    pub fn load(dir: &Path) -> Result<Option<Self>, StoreError> {
        let path = Self::path(dir);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StoreError::io(&path, e)),
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StoreError::Corrupt {
                path,
                line: e.line(),
                message: e.to_string(),
            })
    }

    pub fn save(&self, dir: &Path) -> Result<(), StoreError> {
        let path = Self::path(dir);
        let content = serde_json::to_vec_pretty(self)?;
        write_atomic(&path, &content).map_err(|e| StoreError::io(&path, e))
    }
}

/// Compare `dataset` against the manifest in `dir` without writing anything.
pub fn check_dataset(dir: &Path, dataset: &Path) -> Result<FingerprintCheck, StoreError> {
    let current = calculate_file_checksum(dataset).map_err(|e| StoreError::io(dataset, e))?;
    Ok(match RunManifest::load(dir)? {
        None => FingerprintCheck::New,
        Some(m) if m.dataset_sha256 == current => FingerprintCheck::Unchanged,
        Some(m) => FingerprintCheck::Changed {
            previous: m.dataset_sha256,
            current,
        },
    })
}

/// Record the start of a run over `dataset`, creating or updating the manifest.
///
/// A changed fingerprint is reported and logged, not rejected: row ids are
/// positional, so resuming against an edited dataset may mis-align rows.
pub fn record_run(
    dir: &Path,
    dataset: &Path,
    rows: u64,
) -> Result<(RunManifest, FingerprintCheck), StoreError> {
    let sha = calculate_file_checksum(dataset).map_err(|e| StoreError::io(dataset, e))?;
    let now = Utc::now();

    let (manifest, check) = match RunManifest::load(dir)? {
        None => (
            RunManifest {
                dataset: dataset.to_path_buf(),
                dataset_sha256: sha,
                rows,
                created_at: now,
                updated_at: now,
                runs: 1,
            },
            FingerprintCheck::New,
        ),
        Some(previous) => {
            let check = if previous.dataset_sha256 == sha {
                FingerprintCheck::Unchanged
            } else {
                tracing::warn!(
                    dataset = %dataset.display(),
                    previous = %previous.dataset_sha256,
                    current = %sha,
                    "dataset changed since the last run; row ids may no longer line up"
                );
                FingerprintCheck::Changed {
                    previous: previous.dataset_sha256.clone(),
                    current: sha.clone(),
                }
            };
            (
                RunManifest {
                    dataset: dataset.to_path_buf(),
                    dataset_sha256: sha,
                    rows,
                    created_at: previous.created_at,
                    updated_at: now,
                    runs: previous.runs + 1,
                },
                check,
            )
        }
    };

    manifest.save(dir)?;
    Ok((manifest, check))
}
