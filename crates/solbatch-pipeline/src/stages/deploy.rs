//! Single-project compile and deploy
//!
//! Starts a private chain on the requested port, points the project's
//! development network at it, then runs the framework's `compile`,
//! `deploy` and `exec <script>` steps. The simulator is stopped and the
//! original configuration restored however the steps end.

use crate::config::{DeploySettings, SimulatorSettings};
use crate::error::PipelineError;
use crate::simulator::ChainSimulator;
use crate::stages::run_step;
use solbatch_scaffold::{with_port, CONFIG_FILE};
use std::path::{Path, PathBuf};

/// Rewrites a project configuration's port for as long as it lives
///
/// The original is copied to `<config>_bak` first and copied back on drop.
#[derive(Debug)]
pub struct PortOverride {
    config: PathBuf,
    backup: PathBuf,
}

impl PortOverride {
    /// Point `config` at `port`
    ///
    /// # Errors
    /// Returns `PipelineError` if the file cannot be read, backed up or
    /// written, or has no port field.
    pub fn apply(config: &Path, port: u16) -> Result<Self, PipelineError> {
        let original = std::fs::read_to_string(config).map_err(PipelineError::io("read", config))?;
        let rewritten = with_port(&original, port).ok_or_else(|| PipelineError::MissingPort(config.to_path_buf()))?;

        let mut backup = config.as_os_str().to_owned();
        backup.push("_bak");
        let backup = PathBuf::from(backup);
        std::fs::copy(config, &backup).map_err(PipelineError::io("back up", config))?;

        let guard = Self {
            config: config.to_path_buf(),
            backup,
        };
        std::fs::write(config, rewritten).map_err(PipelineError::io("write", config))?;
        Ok(guard)
    }
}

impl Drop for PortOverride {
    fn drop(&mut self) {
        if let Err(e) = std::fs::rename(&self.backup, &self.config) {
            tracing::error!(config = %self.config.display(), error = %e, "failed to restore project configuration");
        }
    }
}

/// Compile and deploy `project` against a private chain on `port`
///
/// # Errors
/// Returns the first failing step, simulator startup failure, or
/// configuration rewrite failure.
pub async fn deploy_project(
    deploy: &DeploySettings,
    simulator: &SimulatorSettings,
    project: &Path,
    port: u16,
) -> Result<(), PipelineError> {
    let chain = ChainSimulator::start(simulator, port).await?;
    let result = run_deploy_steps(deploy, project, port).await;
    chain.stop().await;
    match &result {
        Ok(()) => tracing::info!(project = %project.display(), port, "deployed"),
        Err(e) => tracing::warn!(project = %project.display(), port, error = %e, "deploy failed"),
    }
    result
}

async fn run_deploy_steps(deploy: &DeploySettings, project: &Path, port: u16) -> Result<(), PipelineError> {
    let _port = PortOverride::apply(&project.join(CONFIG_FILE), port)?;
    let framework = deploy.framework.as_str();
    let script = deploy.extraction_script.to_string_lossy();

    run_step(&format!("{framework} compile"), framework, &["compile"], project).await?;
    run_step(&format!("{framework} deploy"), framework, &["deploy"], project).await?;
    run_step(&format!("{framework} exec"), framework, &["exec", script.as_ref()], project).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use solbatch_scaffold::{config_contents, NetworkSettings};

    fn project_with_config(dir: &Path) -> String {
        let text = config_contents("0.4.26", &NetworkSettings::default());
        std::fs::write(dir.join(CONFIG_FILE), &text).unwrap();
        text
    }

    #[test]
    fn override_rewrites_then_restores() {
        let dir = tempfile::tempdir().unwrap();
        let original = project_with_config(dir.path());
        let config = dir.path().join(CONFIG_FILE);

        {
            let _guard = PortOverride::apply(&config, 8550).unwrap();
            let live = std::fs::read_to_string(&config).unwrap();
            assert!(live.contains("port: 8550"));
            assert!(dir.path().join("truffle-config.js_bak").exists());
        }

        assert_eq!(std::fs::read_to_string(&config).unwrap(), original);
        assert!(!dir.path().join("truffle-config.js_bak").exists());
    }

    #[test]
    fn config_without_port_is_rejected_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join(CONFIG_FILE);
        std::fs::write(&config, "module.exports = {};").unwrap();

        assert!(matches!(
            PortOverride::apply(&config, 8546),
            Err(PipelineError::MissingPort(_))
        ));
        assert_eq!(std::fs::read_to_string(&config).unwrap(), "module.exports = {};");
        assert!(!dir.path().join("truffle-config.js_bak").exists());
    }

    #[tokio::test]
    async fn failing_step_restores_config() {
        let dir = tempfile::tempdir().unwrap();
        let original = project_with_config(dir.path());
        let deploy = DeploySettings {
            framework: "false".to_string(),
            ..DeploySettings::default()
        };

        let err = run_deploy_steps(&deploy, dir.path(), 8551).await.unwrap_err();
        assert!(err.to_string().starts_with("false compile failed"), "{err}");
        assert_eq!(
            std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap(),
            original
        );
    }

    #[tokio::test]
    async fn all_steps_run_in_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        project_with_config(dir.path());
        let deploy = DeploySettings {
            framework: "true".to_string(),
            ..DeploySettings::default()
        };
        run_deploy_steps(&deploy, dir.path(), 8552).await.unwrap();
    }

    #[tokio::test]
    async fn simulator_failure_skips_steps() {
        let dir = tempfile::tempdir().unwrap();
        let original = project_with_config(dir.path());
        let simulator = SimulatorSettings {
            program: "/nonexistent/ganache".to_string(),
            ..SimulatorSettings::default()
        };
        let err = deploy_project(&DeploySettings::default(), &simulator, dir.path(), 8553)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Simulator { .. }));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap(),
            original
        );
    }
}
