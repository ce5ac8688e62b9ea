//! Pipeline stages driven over synthesized projects
//!
//! - [`deploy`]: compile and deploy one project against a private chain
//! - [`deploy_all`]: run the deploy stage over every project
//! - [`train`]: run the fuzzer over every deployed project
//! - [`safemath`]: strip checked-arithmetic guards and recompile
//! - [`single`]: scaffold and deploy one source file

pub mod deploy;
pub mod deploy_all;
pub mod safemath;
pub mod single;
pub mod train;

use crate::error::PipelineError;
use solbatch_jobs::{CheckpointStore, JobRunner, RunSummary};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Checkpoint location and pool shape shared by the per-project stages
#[derive(Debug, Clone)]
pub struct StageOptions {
    /// Directory holding the stage checkpoints
    pub state_dir: PathBuf,
    /// Worker-pool width
    pub concurrency: usize,
    /// Recorded outcomes between checkpoint flushes
    pub flush_every: usize,
    /// Clear recorded failures before starting
    pub retry_failed: bool,
}

impl StageOptions {
    /// Checkpoint store for the stage named `run`
    #[must_use]
    pub fn store(&self, run: &str) -> CheckpointStore {
        CheckpointStore::new(&self.state_dir, run)
    }

    /// Runner for the stage named `run`, with failures cleared if requested
    ///
    /// # Errors
    /// Returns `PipelineError::Jobs` on zero concurrency or checkpoint I/O failure.
    pub fn runner(&self, run: &str) -> Result<JobRunner, PipelineError> {
        let runner = JobRunner::new(self.store(run), self.concurrency)?.with_flush_every(self.flush_every);
        if self.retry_failed {
            runner.retry_failed()?;
        }
        Ok(runner)
    }
}

/// Log every failure of a finished stage run, then its counters
pub(crate) fn log_summary(summary: &RunSummary) {
    for (item, detail) in &summary.failures {
        tracing::warn!(%item, %detail, "failed");
    }
    tracing::info!(
        succeeded = summary.succeeded,
        failed = summary.failed(),
        skipped = summary.skipped_succeeded + summary.skipped_failed,
        abandoned = summary.abandoned,
        not_started = summary.not_started,
        cancelled = summary.cancelled,
        "stage finished"
    );
}

/// Substitute `{name}` placeholders in every argument
#[must_use]
pub fn expand_template(template: &[String], vars: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            vars.iter().fold(arg.clone(), |acc, (name, value)| {
                acc.replace(&format!("{{{name}}}"), value)
            })
        })
        .collect()
}

/// Run one named step in `dir`, inheriting output
///
/// # Errors
/// Returns `StepSpawn` or `StepFailed` naming the step.
pub async fn run_step(step: &str, program: &str, args: &[&str], dir: &Path) -> Result<(), PipelineError> {
    tracing::debug!(step, dir = %dir.display(), "running step");
    let status = Command::new(program)
        .args(args)
        .current_dir(dir)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|source| PipelineError::StepSpawn {
            step: step.to_string(),
            source,
        })?;
    if status.success() {
        Ok(())
    } else {
        Err(PipelineError::StepFailed {
            step: step.to_string(),
            status,
        })
    }
}

/// Directory names under `root`, sorted, optionally filtered by prefix
///
/// # Errors
/// Returns `PipelineError` if `root` is not a readable directory.
pub fn project_dirs(root: &Path, prefix: Option<&str>) -> Result<Vec<PathBuf>, PipelineError> {
    if !root.is_dir() {
        return Err(PipelineError::NotADirectory(root.to_path_buf()));
    }
    let mut dirs = Vec::new();
    for entry in std::fs::read_dir(root).map_err(PipelineError::io("read", root))? {
        let path = entry.map_err(PipelineError::io("read", root))?.path();
        let matches = path
            .file_name()
            .map(|n| n.to_string_lossy())
            .is_some_and(|name| prefix.map_or(true, |p| name.starts_with(p)));
        if path.is_dir() && matches {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn template_placeholders_are_replaced_everywhere() {
        let template = vec![
            "fuzz".to_string(),
            "--proj={project}".to_string(),
            "{contract}".to_string(),
            "{unknown}".to_string(),
        ];
        assert_eq!(
            expand_template(&template, &[("project", "/p/0x1"), ("contract", "Token")]),
            vec!["fuzz", "--proj=/p/0x1", "Token", "{unknown}"]
        );
    }

    #[tokio::test]
    async fn step_failure_names_the_step() {
        let dir = tempfile::tempdir().unwrap();
        run_step("ok", "sh", &["-c", "exit 0"], dir.path()).await.unwrap();
        let err = run_step("truffle deploy", "sh", &["-c", "exit 4"], dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("truffle deploy failed"), "{err}");
        assert!(matches!(
            run_step("x", "/nonexistent/bin", &[], dir.path()).await,
            Err(PipelineError::StepSpawn { .. })
        ));
    }

    #[test]
    fn project_dirs_filter_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["0xa1", "0xb2", "0xa3"] {
            std::fs::create_dir(dir.path().join(name)).unwrap();
        }
        std::fs::write(dir.path().join("0xa9"), "file, not project").unwrap();

        let all = project_dirs(dir.path(), None).unwrap();
        assert_eq!(all.len(), 3);
        let filtered = project_dirs(dir.path(), Some("0xa")).unwrap();
        assert_eq!(filtered, vec![dir.path().join("0xa1"), dir.path().join("0xa3")]);
    }
}
