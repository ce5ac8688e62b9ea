//! Bucket snapshot cache
//!
//! Bucketing a corpus means reading and resolving every file, so the result
//! is cached as a flat JSON map from release string to file names. The cache
//! file is keyed by a SHA-256 of the corpus path.

use crate::error::PipelineError;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Release string to the file names resolved to it
pub type Buckets = BTreeMap<String, Vec<String>>;

/// Stable identity of a corpus directory
#[must_use]
pub fn corpus_key(corpus: &Path) -> String {
    let digest = Sha256::digest(corpus.to_string_lossy().as_bytes());
    hex::encode(digest)
}

/// Snapshot file for `corpus` under `state_dir`
#[must_use]
pub fn snapshot_path(state_dir: &Path, corpus: &Path) -> PathBuf {
    state_dir.join(format!("trufflize_{}_project_versions.json", corpus_key(corpus)))
}

/// Read a snapshot; `Ok(None)` if none exists
///
/// # Errors
/// Returns `PipelineError` if the file exists but cannot be read or parsed.
pub fn load(path: &Path) -> Result<Option<Buckets>, PipelineError> {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PipelineError::io("read", path)(e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| PipelineError::CorruptState {
            path: path.to_path_buf(),
            source,
        })
}

/// Write a snapshot atomically
///
/// # Errors
/// Returns `PipelineError::Io` if the file cannot be written.
pub fn save(path: &Path, buckets: &Buckets) -> Result<(), PipelineError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(PipelineError::io("create", parent))?;
    let bytes = serde_json::to_vec(buckets).map_err(|source| PipelineError::CorruptState {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(PipelineError::io("create", parent))?;
    tmp.write_all(&bytes).map_err(PipelineError::io("write", path))?;
    tmp.as_file().sync_all().map_err(PipelineError::io("sync", path))?;
    tmp.persist(path)
        .map_err(|e| PipelineError::io("replace", path)(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn key_is_stable_and_path_specific() {
        let a = corpus_key(Path::new("/data/corpus"));
        assert_eq!(a, corpus_key(Path::new("/data/corpus")));
        assert_ne!(a, corpus_key(Path::new("/data/other")));
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot_path(dir.path(), Path::new("/data/corpus"));
        assert_eq!(load(&path).unwrap(), None);

        let buckets = Buckets::from([
            ("0.4.26".to_string(), vec!["a.sol".to_string(), "b.sol".to_string()]),
            ("0.5.16".to_string(), vec!["c.sol".to_string()]),
        ]);
        save(&path, &buckets).unwrap();
        assert_eq!(load(&path).unwrap(), Some(buckets));

        let raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw["0.5.16"], serde_json::json!(["c.sol"]));
    }

    #[test]
    fn resave_replaces_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = snapshot_path(dir.path(), Path::new("/data/corpus"));
        save(&path, &Buckets::from([("0.4.26".to_string(), vec!["a.sol".to_string()])])).unwrap();

        let second = Buckets::from([("0.5.16".to_string(), vec!["b.sol".to_string()])]);
        save(&path, &second).unwrap();
        assert_eq!(load(&path).unwrap(), Some(second));

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries, vec![path]);
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snap.json");
        std::fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(load(&path), Err(PipelineError::CorruptState { .. })));
    }
}
