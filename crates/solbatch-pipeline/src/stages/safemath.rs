//! Checked-arithmetic guard stripping
//!
//! Comments out the overflow guards of a safe-math library so the fuzzer
//! can reach arithmetic wrap-around, then recompiles the project. A rewrite
//! that no longer compiles is rolled back from a `<source>_bak` copy.
//!
//! Each pattern is applied to the unmodified source and only the last
//! pattern's result is kept, so with the default patterns only the
//! `require(c >= a...)` addition guard is ever stripped.

use crate::error::PipelineError;
use crate::stages::{log_summary, project_dirs, run_step, StageOptions};
use async_trait::async_trait;
use regex::Regex;
use solbatch_jobs::{CancelSignal, Outcome, RunSummary, Worker};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Checkpoint name of this stage
pub const RUN_NAME: &str = "strip-safemath";

/// Compile the configured guard patterns
///
/// # Errors
/// Returns `PipelineError::InvalidPattern` for the first malformed pattern.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, PipelineError> {
    patterns
        .iter()
        .map(|pattern| {
            Regex::new(pattern).map_err(|source| PipelineError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

/// Source with guards commented out; `None` if nothing changed
#[must_use]
pub fn strip_guards(contents: &str, patterns: &[Regex]) -> Option<String> {
    let stripped = patterns.last()?.replace_all(contents, "// ${1} ");
    (stripped != contents).then(|| stripped.into_owned())
}

/// The only `.sol` file under `<project>/contracts`
///
/// # Errors
/// Returns `PipelineError::SourceCount` unless exactly one is present.
pub fn single_source(project: &Path) -> Result<PathBuf, PipelineError> {
    let contracts = project.join("contracts");
    let mut sources = Vec::new();
    if contracts.is_dir() {
        for entry in std::fs::read_dir(&contracts).map_err(PipelineError::io("read", &contracts))? {
            let path = entry.map_err(PipelineError::io("read", &contracts))?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "sol") {
                sources.push(path);
            }
        }
    }
    match sources.len() {
        1 => Ok(sources.swap_remove(0)),
        found => Err(PipelineError::SourceCount { dir: contracts, found }),
    }
}

fn backup_path(source: &Path) -> PathBuf {
    let mut backup = source.as_os_str().to_owned();
    backup.push("_bak");
    PathBuf::from(backup)
}

/// `<source>_bak` copy that puts the original back unless committed
struct SourceBackup {
    source: PathBuf,
    backup: PathBuf,
    settled: bool,
}

impl SourceBackup {
    fn take(source: &Path) -> Result<Self, PipelineError> {
        let backup = backup_path(source);
        std::fs::copy(source, &backup).map_err(PipelineError::io("back up", source))?;
        Ok(Self {
            source: source.to_path_buf(),
            backup,
            settled: false,
        })
    }

    /// Keep the rewrite and drop the copy
    fn commit(mut self) -> Result<(), PipelineError> {
        self.settled = true;
        std::fs::remove_file(&self.backup).map_err(PipelineError::io("remove", &self.backup))
    }

    /// Put the original back
    fn restore(mut self) -> Result<(), PipelineError> {
        self.settled = true;
        std::fs::rename(&self.backup, &self.source).map_err(PipelineError::io("restore", &self.source))
    }
}

impl Drop for SourceBackup {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        if let Err(e) = std::fs::rename(&self.backup, &self.source) {
            tracing::error!(source = %self.source.display(), error = %e, "failed to restore source");
        }
    }
}

struct StripWorker {
    root: PathBuf,
    patterns: Vec<Regex>,
    framework: String,
}

impl StripWorker {
    async fn strip(&self, project: &Path) -> Result<(), PipelineError> {
        let source = single_source(project)?;
        let contents = tokio::fs::read_to_string(&source)
            .await
            .map_err(PipelineError::io("read", &source))?;
        let Some(stripped) = strip_guards(&contents, &self.patterns) else {
            return Err(PipelineError::NoGuards(source));
        };

        let backup = SourceBackup::take(&source)?;
        tokio::fs::write(&source, stripped)
            .await
            .map_err(PipelineError::io("write", &source))?;

        let step = format!("{} compile", self.framework);
        match run_step(&step, &self.framework, &["compile"], project).await {
            Ok(()) => {
                backup.commit()?;
                tracing::debug!(source = %source.display(), "guards stripped");
                Ok(())
            }
            Err(e) => {
                backup.restore()?;
                tracing::debug!(source = %source.display(), error = %e, "rewrite rolled back");
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Worker for StripWorker {
    async fn run(&self, item: &str, _slot: usize) -> Outcome {
        self.strip(&self.root.join(item)).await.into()
    }
}

/// Strip guards in every project under `root` whose name starts with `prefix`
///
/// # Errors
/// Returns `PipelineError` if a pattern is malformed, `root` is not a
/// directory, or the checkpoint cannot be used.
pub async fn strip_all(
    root: &Path,
    prefix: Option<&str>,
    patterns: &[String],
    framework: &str,
    options: &StageOptions,
    cancel: CancelSignal,
) -> Result<RunSummary, PipelineError> {
    let patterns = compile_patterns(patterns)?;
    let projects: Vec<String> = project_dirs(root, prefix)?
        .iter()
        .filter_map(|dir| dir.file_name().map(|n| n.to_string_lossy().into_owned()))
        .collect();
    tracing::info!(root = %root.display(), projects = projects.len(), ?prefix, "stripping safe-math guards");

    let runner = options.runner(RUN_NAME)?;
    let worker = Arc::new(StripWorker {
        root: root.to_path_buf(),
        patterns,
        framework: framework.to_string(),
    });
    let summary = runner.run_all(projects, worker, cancel).await?;
    log_summary(&summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SafemathSettings;
    use pretty_assertions::assert_eq;

    const SAFE_MATH: &str = "\
function sub(uint256 a, uint256 b) internal pure returns (uint256) {
    require(b <= a, \"SafeMath: subtraction overflow\");
    return a - b;
}
function add(uint256 a, uint256 b) internal pure returns (uint256) {
    uint256 c = a + b;
    require(c >= a, \"SafeMath: addition overflow\");
    return c;
}";

    fn default_patterns() -> Vec<Regex> {
        compile_patterns(&SafemathSettings::default().patterns).unwrap()
    }

    fn options(dir: &Path) -> StageOptions {
        StageOptions {
            state_dir: dir.join("state"),
            concurrency: 2,
            flush_every: 1,
            retry_failed: false,
        }
    }

    fn project(root: &Path, name: &str, sources: &[(&str, &str)]) -> PathBuf {
        let contracts = root.join(name).join("contracts");
        std::fs::create_dir_all(&contracts).unwrap();
        for (file, text) in sources {
            std::fs::write(contracts.join(file), text).unwrap();
        }
        contracts
    }

    #[test]
    fn abandoned_backup_restores_the_source() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("SafeMath.sol");
        std::fs::write(&source, SAFE_MATH).unwrap();

        {
            let _backup = SourceBackup::take(&source).unwrap();
            std::fs::write(&source, "half written").unwrap();
        }

        assert_eq!(std::fs::read_to_string(&source).unwrap(), SAFE_MATH);
        assert!(!backup_path(&source).exists());
    }

    #[test]
    fn committed_backup_keeps_the_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("SafeMath.sol");
        std::fs::write(&source, SAFE_MATH).unwrap();

        let backup = SourceBackup::take(&source).unwrap();
        std::fs::write(&source, "stripped").unwrap();
        backup.commit().unwrap();

        assert_eq!(std::fs::read_to_string(&source).unwrap(), "stripped");
        assert!(!backup_path(&source).exists());
    }

    #[test]
    fn last_pattern_decides_the_rewrite() {
        let stripped = strip_guards(SAFE_MATH, &default_patterns()).unwrap();
        assert!(stripped.contains("// require(c >= a, \"SafeMath: addition overflow\"); "));
        assert!(stripped.contains("    require(b <= a,"));
        assert!(!stripped.contains("// require(b <= a"));
    }

    #[test]
    fn unmatched_source_is_unchanged() {
        assert_eq!(strip_guards("contract A {}", &default_patterns()), None);
        assert_eq!(strip_guards(SAFE_MATH, &[]), None);
    }

    #[test]
    fn malformed_pattern_is_rejected() {
        assert!(matches!(
            compile_patterns(&["(unclosed".to_string()]),
            Err(PipelineError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn project_needs_exactly_one_source() {
        let dir = tempfile::tempdir().unwrap();
        project(dir.path(), "none", &[]);
        project(dir.path(), "two", &[("a.sol", ""), ("b.sol", "")]);
        let one = project(dir.path(), "one", &[("a.sol", ""), ("notes.md", "")]);

        assert!(matches!(
            single_source(&dir.path().join("none")),
            Err(PipelineError::SourceCount { found: 0, .. })
        ));
        assert!(matches!(
            single_source(&dir.path().join("two")),
            Err(PipelineError::SourceCount { found: 2, .. })
        ));
        assert_eq!(single_source(&dir.path().join("one")).unwrap(), one.join("a.sol"));
    }

    #[tokio::test]
    async fn failed_compile_restores_source() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("projects");
        let kept = project(&root, "0xa1", &[("Token.sol", SAFE_MATH)]);

        let summary = strip_all(
            &root,
            None,
            &SafemathSettings::default().patterns,
            "false",
            &options(dir.path()),
            CancelSignal::never(),
        )
        .await
        .unwrap();

        assert!(summary.failures["0xa1"].starts_with("false compile failed"));
        assert_eq!(std::fs::read_to_string(kept.join("Token.sol")).unwrap(), SAFE_MATH);
        assert!(!kept.join("Token.sol_bak").exists());
    }

    #[tokio::test]
    async fn prefix_limits_projects_and_rewrite_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("projects");
        let selected = project(&root, "0xa1", &[("Token.sol", SAFE_MATH)]);
        let other = project(&root, "0xb2", &[("Token.sol", SAFE_MATH)]);
        project(&root, "0xa3", &[("Plain.sol", "contract Plain {}")]);

        let summary = strip_all(
            &root,
            Some("0xa"),
            &SafemathSettings::default().patterns,
            "true",
            &options(dir.path()),
            CancelSignal::never(),
        )
        .await
        .unwrap();

        assert_eq!(summary.discovered, 2);
        assert_eq!(summary.succeeded, 1);
        assert!(summary.failures["0xa3"].contains("no safe-math guard"));
        assert!(std::fs::read_to_string(selected.join("Token.sol"))
            .unwrap()
            .contains("// require(c >= a"));
        assert!(!selected.join("Token.sol_bak").exists());
        assert_eq!(std::fs::read_to_string(other.join("Token.sol")).unwrap(), SAFE_MATH);
    }
}
