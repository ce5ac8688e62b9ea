//! Project synthesis
//!
//! Writes one minimal buildable project per extracted contract:
//!
//! ```text
//! <output>/<stem>/
//!   truffle-config.js
//!   contracts/<source file>            (byte-for-byte copy)
//!   migrations/1_initial_migration.js
//!   migrations/2_deploy_contracts.js
//!   build/contracts/Migrations.json    (pre-built fixture, never regenerated)
//! ```

use crate::error::ScaffoldError;
use crate::templates::{
    config_contents, deploy_script, NetworkSettings, CONFIG_FILE, DEPLOY_MIGRATION_FILE,
    INITIAL_MIGRATION, INITIAL_MIGRATION_FILE, MIGRATIONS_ARTIFACT_FILE,
};
use solbatch_extract::ExtractionResult;
use std::path::{Path, PathBuf};
use tokio::fs;

/// A synthesized project on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectScaffold {
    /// Project root
    pub root: PathBuf,
    /// Generated configuration file
    pub config: PathBuf,
    /// Generated migration scripts, in execution order
    pub migrations: Vec<PathBuf>,
    /// Copied source file
    pub source: PathBuf,
    /// Copied bootstrap migration artifact
    pub migrations_artifact: PathBuf,
    /// Deployed contract
    pub contract: String,
    /// Pinned compiler release
    pub version: String,
}

/// Writes project scaffolds
#[derive(Debug, Clone)]
pub struct ProjectSynthesizer {
    network: NetworkSettings,
    migrations_artifact: PathBuf,
}

impl ProjectSynthesizer {
    /// Create with the development network and the pre-built artifact path
    #[inline]
    #[must_use]
    pub fn new(network: NetworkSettings, migrations_artifact: impl Into<PathBuf>) -> Self {
        Self {
            network,
            migrations_artifact: migrations_artifact.into(),
        }
    }

    /// Project root `source` will be synthesized into under `output_dir`
    ///
    /// # Errors
    /// Returns `ScaffoldError::InvalidSource` if `source` has no file stem.
    pub fn project_dir(source: &Path, output_dir: &Path) -> Result<PathBuf, ScaffoldError> {
        let stem = source
            .file_stem()
            .ok_or_else(|| ScaffoldError::InvalidSource(source.to_path_buf()))?;
        Ok(output_dir.join(stem))
    }

    /// Write the scaffold for `extraction` of `source`, pinned to `version`
    ///
    /// # Errors
    /// Returns `ScaffoldError::Filesystem` on any write or copy failure.
    pub async fn synthesize(
        &self,
        source: &Path,
        extraction: &ExtractionResult,
        version: &str,
        output_dir: &Path,
    ) -> Result<ProjectScaffold, ScaffoldError> {
        let root = Self::project_dir(source, output_dir)?;
        let file_name = source
            .file_name()
            .ok_or_else(|| ScaffoldError::InvalidSource(source.to_path_buf()))?;

        let contracts_dir = root.join("contracts");
        let migrations_dir = root.join("migrations");
        let build_dir = root.join("build").join("contracts");
        for dir in [&contracts_dir, &migrations_dir, &build_dir] {
            fs::create_dir_all(dir)
                .await
                .map_err(ScaffoldError::fs("create", dir.as_path()))?;
        }

        let config = root.join(CONFIG_FILE);
        write(&config, config_contents(version, &self.network)).await?;

        let initial = migrations_dir.join(INITIAL_MIGRATION_FILE);
        write(&initial, INITIAL_MIGRATION.to_string()).await?;

        let deploy = migrations_dir.join(DEPLOY_MIGRATION_FILE);
        write(&deploy, deploy_script(&[extraction.contract.as_str()])).await?;

        let artifact = build_dir.join(MIGRATIONS_ARTIFACT_FILE);
        copy(&self.migrations_artifact, &artifact).await?;

        let copied_source = contracts_dir.join(file_name);
        copy(source, &copied_source).await?;

        tracing::debug!(
            project = %root.display(),
            contract = %extraction.contract,
            version,
            "synthesized project"
        );

        Ok(ProjectScaffold {
            root,
            config,
            migrations: vec![initial, deploy],
            source: copied_source,
            migrations_artifact: artifact,
            contract: extraction.contract.clone(),
            version: version.to_string(),
        })
    }
}

async fn write(path: &Path, contents: String) -> Result<(), ScaffoldError> {
    fs::write(path, contents)
        .await
        .map_err(ScaffoldError::fs("write", path))
}

async fn copy(from: &Path, to: &Path) -> Result<(), ScaffoldError> {
    fs::copy(from, to)
        .await
        .map(|_| ())
        .map_err(ScaffoldError::fs("copy to", to))
}
