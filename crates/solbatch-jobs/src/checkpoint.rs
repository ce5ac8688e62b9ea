//! Durable run state
//!
//! A checkpoint is two flat JSON files per run:
//! - `<run>_visited.json`: list of succeeded item keys
//! - `<run>_failed.json`: map of failed item key to diagnostic text
//!
//! Both are read in full at startup and rewritten in full at each flush
//! point. Writes go through a sibling temp file and an atomic rename, so a
//! crash mid-flush leaves the previous snapshot intact.

use crate::error::CheckpointError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Terminal outcomes recorded so far
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    /// Items that succeeded
    pub succeeded: BTreeSet<String>,
    /// Items that failed, with diagnostic detail
    pub failed: BTreeMap<String, String>,
}

impl Checkpoint {
    /// Whether `key` already has a terminal outcome
    #[inline]
    #[must_use]
    pub fn is_settled(&self, key: &str) -> bool {
        self.succeeded.contains(key) || self.failed.contains_key(key)
    }

    /// Record a success; a key is never kept in both sets
    pub fn record_success(&mut self, key: &str) {
        self.failed.remove(key);
        self.succeeded.insert(key.to_string());
    }

    /// Record a failure; a key is never kept in both sets
    pub fn record_failure(&mut self, key: &str, detail: impl Into<String>) {
        self.succeeded.remove(key);
        self.failed.insert(key.to_string(), detail.into());
    }

    /// Forget every failure so the next run retries those items
    pub fn clear_failures(&mut self) -> usize {
        let cleared = self.failed.len();
        self.failed.clear();
        cleared
    }

    /// Keys from `discovered` with no terminal outcome, in key order
    #[must_use]
    pub fn remaining<I>(&self, discovered: I) -> Vec<String>
    where
        I: IntoIterator<Item = String>,
    {
        let discovered: BTreeSet<String> = discovered.into_iter().collect();
        discovered
            .into_iter()
            .filter(|key| !self.is_settled(key))
            .collect()
    }
}

/// File pair backing one run's checkpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStore {
    visited: PathBuf,
    failed: PathBuf,
}

impl CheckpointStore {
    /// Store for `run` under `state_dir`
    #[must_use]
    pub fn new(state_dir: &Path, run: &str) -> Self {
        Self {
            visited: state_dir.join(format!("{run}_visited.json")),
            failed: state_dir.join(format!("{run}_failed.json")),
        }
    }

    /// Store with explicit file paths
    #[inline]
    #[must_use]
    pub fn with_paths(visited: impl Into<PathBuf>, failed: impl Into<PathBuf>) -> Self {
        Self {
            visited: visited.into(),
            failed: failed.into(),
        }
    }

    /// Path of the succeeded-items list
    #[inline]
    #[must_use]
    pub fn visited_path(&self) -> &Path {
        &self.visited
    }

    /// Path of the failure map
    #[inline]
    #[must_use]
    pub fn failed_path(&self) -> &Path {
        &self.failed
    }

    /// Read the checkpoint; missing files read as empty
    ///
    /// A key present in both files is treated as failed.
    ///
    /// # Errors
    /// Returns `CheckpointError` if a file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Checkpoint, CheckpointError> {
        let succeeded: Vec<String> = read_json(&self.visited)?.unwrap_or_default();
        let failed: BTreeMap<String, String> = read_json(&self.failed)?.unwrap_or_default();

        let mut succeeded: BTreeSet<String> = succeeded.into_iter().collect();
        let overlap = succeeded.iter().filter(|k| failed.contains_key(*k)).count();
        if overlap > 0 {
            tracing::warn!(overlap, "checkpoint lists items as both succeeded and failed");
            succeeded.retain(|k| !failed.contains_key(k));
        }

        Ok(Checkpoint { succeeded, failed })
    }

    /// Rewrite both files from `checkpoint`
    ///
    /// # Errors
    /// Returns `CheckpointError::Io` if either file cannot be written.
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let succeeded: Vec<&String> = checkpoint.succeeded.iter().collect();
        write_json_atomic(&self.visited, &succeeded)?;
        write_json_atomic(&self.failed, &checkpoint.failed)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CheckpointError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CheckpointError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| CheckpointError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CheckpointError> {
    let io_err = |source| CheckpointError::Io {
        path: path.to_path_buf(),
        source,
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(io_err)?;

    let bytes = serde_json::to_vec(value).map_err(|source| CheckpointError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    tmp.write_all(&bytes).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}
