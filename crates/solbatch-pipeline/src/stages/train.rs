//! Fuzzer training-data generation
//!
//! Runs the fuzzer once per successfully deployed project. The work set is
//! the deploy stage's success set; each project's target contract is read
//! back from its generated deploy script.

use crate::error::PipelineError;
use crate::stages::{expand_template, log_summary, StageOptions};
use async_trait::async_trait;
use solbatch_jobs::{run_command, CancelSignal, CheckpointStore, Outcome, RunSummary, Worker};
use solbatch_scaffold::{deployed_contract, DEPLOY_MIGRATION_FILE};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;

/// Checkpoint name of this stage
pub const RUN_NAME: &str = "train";

/// Where the deploy stage's success set is read from
#[derive(Debug, Clone)]
pub enum DeployedSet {
    /// The deploy checkpoint under the state directory
    Checkpoint,
    /// An explicit success-set file
    File(PathBuf),
}

/// Projects the deploy stage recorded as succeeded
///
/// # Errors
/// Returns `PipelineError::Jobs` if the checkpoint cannot be read.
pub fn deployed_projects(source: &DeployedSet, options: &StageOptions) -> Result<Vec<String>, PipelineError> {
    let store = match source {
        DeployedSet::Checkpoint => options.store(super::deploy_all::RUN_NAME),
        DeployedSet::File(visited) => {
            let unused = options.state_dir.join(format!("{}_failed.json", super::deploy_all::RUN_NAME));
            CheckpointStore::with_paths(visited.clone(), unused)
        }
    };
    Ok(store.load()?.succeeded.into_iter().collect())
}

/// Name of the dataset file for `project`
#[must_use]
pub fn dataset_path(output: &Path, project: &Path) -> PathBuf {
    let name = project
        .file_name()
        .map_or_else(|| "project".into(), |n| n.to_string_lossy());
    output.join(format!("{name}.data"))
}

struct TrainWorker {
    root: PathBuf,
    output: PathBuf,
    program: String,
    args: Vec<String>,
}

impl TrainWorker {
    async fn command(&self, item: &str) -> Result<Command, String> {
        let project = self.root.join(item);
        let script_path = project.join("migrations").join(DEPLOY_MIGRATION_FILE);
        let script = tokio::fs::read_to_string(&script_path)
            .await
            .map_err(|e| format!("cannot read {}: {e}", script_path.display()))?;
        let contract = deployed_contract(&script).map_err(|e| e.to_string())?;

        let project_arg = project.to_string_lossy().into_owned();
        let dataset = dataset_path(&self.output, &project).to_string_lossy().into_owned();
        let args = expand_template(
            &self.args,
            &[("project", &project_arg), ("contract", &contract), ("dataset", &dataset)],
        );
        tracing::debug!(project = %project_arg, %contract, %dataset, "training");

        let mut command = Command::new(&self.program);
        command.args(args).current_dir(&self.root);
        Ok(command)
    }
}

#[async_trait]
impl Worker for TrainWorker {
    async fn run(&self, item: &str, _slot: usize) -> Outcome {
        match self.command(item).await {
            Ok(mut command) => run_command(&mut command).await,
            Err(detail) => Outcome::Failed(detail),
        }
    }
}

/// Run the fuzzer over every deployed project under `root`
///
/// # Errors
/// Returns `PipelineError` if the template is empty, the output directory
/// cannot be created, or a checkpoint cannot be used.
pub async fn train_all(
    root: &Path,
    output: &Path,
    projects: Vec<String>,
    template: &[String],
    options: &StageOptions,
    cancel: CancelSignal,
) -> Result<RunSummary, PipelineError> {
    let Some((program, args)) = template.split_first() else {
        return Err(PipelineError::EmptyCommand("train"));
    };
    tokio::fs::create_dir_all(output)
        .await
        .map_err(PipelineError::io("create", output))?;
    tracing::info!(projects = projects.len(), output = %output.display(), "training over deployed projects");

    let runner = options.runner(RUN_NAME)?;
    let worker = Arc::new(TrainWorker {
        root: root.to_path_buf(),
        output: output.to_path_buf(),
        program: program.clone(),
        args: args.to_vec(),
    });
    let summary = runner.run_all(projects, worker, cancel).await?;
    log_summary(&summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use solbatch_jobs::Checkpoint;
    use solbatch_scaffold::deploy_script;

    fn options(dir: &Path) -> StageOptions {
        StageOptions {
            state_dir: dir.join("state"),
            concurrency: 1,
            flush_every: 1,
            retry_failed: false,
        }
    }

    fn project(root: &Path, name: &str, contracts: &[&str]) {
        let migrations = root.join(name).join("migrations");
        std::fs::create_dir_all(&migrations).unwrap();
        std::fs::write(migrations.join(DEPLOY_MIGRATION_FILE), deploy_script(contracts)).unwrap();
    }

    #[test]
    fn dataset_named_after_project() {
        assert_eq!(
            dataset_path(Path::new("/out"), Path::new("/projects/0xabc")),
            PathBuf::from("/out/0xabc.data")
        );
    }

    #[test]
    fn work_set_is_deploy_success_set() {
        let dir = tempfile::tempdir().unwrap();
        let options = options(dir.path());
        let mut checkpoint = Checkpoint::default();
        checkpoint.record_success("0x1");
        checkpoint.record_failure("0x2", "deploy failed");
        options.store(super::super::deploy_all::RUN_NAME).save(&checkpoint).unwrap();

        assert_eq!(deployed_projects(&DeployedSet::Checkpoint, &options).unwrap(), vec!["0x1"]);

        let visited = dir.path().join("elsewhere_visited.json");
        std::fs::write(&visited, r#"["0x9", "0x8"]"#).unwrap();
        assert_eq!(
            deployed_projects(&DeployedSet::File(visited), &options).unwrap(),
            vec!["0x8", "0x9"]
        );
    }

    #[tokio::test]
    async fn fuzzer_gets_contract_and_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("projects");
        let output = dir.path().join("data");
        project(&root, "0x1", &["Token"]);
        let template = vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo {contract} > {dataset}".to_string(),
        ];

        let summary = train_all(
            &root,
            &output,
            vec!["0x1".to_string()],
            &template,
            &options(dir.path()),
            CancelSignal::never(),
        )
        .await
        .unwrap();
        assert_eq!(summary.succeeded, 1);
        assert_eq!(std::fs::read_to_string(output.join("0x1.data")).unwrap().trim(), "Token");
    }

    #[tokio::test]
    async fn ambiguous_deploy_script_fails_the_item() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("projects");
        project(&root, "0x1", &["A", "B"]);
        std::fs::create_dir_all(root.join("0x2")).unwrap();

        let summary = train_all(
            &root,
            &dir.path().join("data"),
            vec!["0x1".to_string(), "0x2".to_string()],
            &["true".to_string()],
            &options(dir.path()),
            CancelSignal::never(),
        )
        .await
        .unwrap();
        assert_eq!(summary.succeeded, 0);
        assert!(summary.failures["0x1"].contains("2 contracts"));
        assert!(summary.failures["0x2"].starts_with("cannot read"));
    }
}
