//! Deploy every project under a root
//!
//! Projects are found by their configuration file anywhere below the root
//! and keyed by their path relative to it. Each is handed to a deploy
//! command (by default this binary's own `deploy` subcommand) on the port
//! `base_port + slot`, so concurrent deployments never share a chain.

use crate::error::PipelineError;
use crate::stages::{expand_template, log_summary, StageOptions};
use solbatch_jobs::{CancelSignal, CommandWorker, RunSummary};
use solbatch_scaffold::CONFIG_FILE;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use walkdir::WalkDir;

/// Checkpoint name of this stage
pub const RUN_NAME: &str = "deploy";

/// Project directories under `root`, relative to it, sorted
///
/// # Errors
/// Returns `PipelineError::NotADirectory` if `root` is not a directory.
pub fn discover_projects(root: &Path) -> Result<Vec<String>, PipelineError> {
    if !root.is_dir() {
        return Err(PipelineError::NotADirectory(root.to_path_buf()));
    }
    let mut projects: Vec<String> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.file_name() != "node_modules")
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(error = %e, "skipping unreadable entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == CONFIG_FILE)
        .filter_map(|entry| {
            let dir = entry.path().parent()?;
            let relative = dir.strip_prefix(root).ok()?;
            Some(relative.to_string_lossy().into_owned())
        })
        .collect();
    projects.sort();
    Ok(projects)
}

/// Command template that re-invokes this binary's `deploy` subcommand
///
/// # Errors
/// Returns `PipelineError::Io` if the running executable cannot be located.
pub fn self_deploy_command(config: Option<&Path>) -> Result<Vec<String>, PipelineError> {
    let exe = std::env::current_exe().map_err(PipelineError::io("locate", "current executable"))?;
    let mut command = vec![exe.to_string_lossy().into_owned()];
    if let Some(config) = config {
        command.push("--config".to_string());
        command.push(config.to_string_lossy().into_owned());
    }
    command.extend(
        ["deploy", "--project", "{project}", "--port", "{port}"]
            .into_iter()
            .map(String::from),
    );
    Ok(command)
}

/// Deploy every project under `root`
///
/// `template` may use `{project}` (absolute project directory) and
/// `{port}`.
///
/// # Errors
/// Returns `PipelineError` if the root is not a directory, the port range
/// overflows, the template is empty, or the checkpoint cannot be used.
pub async fn deploy_all(
    root: &Path,
    template: Vec<String>,
    base_port: u16,
    options: &StageOptions,
    cancel: CancelSignal,
) -> Result<RunSummary, PipelineError> {
    let last_slot = u16::try_from(options.concurrency.saturating_sub(1)).ok();
    if last_slot.and_then(|slot| base_port.checked_add(slot)).is_none() {
        return Err(PipelineError::PortRange {
            base: base_port,
            concurrency: options.concurrency,
        });
    }
    let Some((program, args)) = template.split_first() else {
        return Err(PipelineError::EmptyCommand("deploy"));
    };
    let (program, args) = (program.clone(), args.to_vec());

    let projects = discover_projects(root)?;
    tracing::info!(root = %root.display(), projects = projects.len(), "discovered projects");

    let runner = options.runner(RUN_NAME)?;
    let root: PathBuf = root.to_path_buf();
    let worker = Arc::new(CommandWorker::new(move |item: &str, slot: usize| {
        let project = root.join(item).to_string_lossy().into_owned();
        // In range: checked against the pool width above.
        let port = (base_port + u16::try_from(slot).unwrap_or(0)).to_string();
        tracing::debug!(%project, %port, "deploying");
        let mut command = Command::new(&program);
        command
            .args(expand_template(&args, &[("project", &project), ("port", &port)]))
            .current_dir(&root);
        command
    }));

    let summary = runner.run_all(projects, worker, cancel).await?;
    log_summary(&summary);
    Ok(summary)
}
