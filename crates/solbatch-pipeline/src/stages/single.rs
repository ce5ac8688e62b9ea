//! One-file scaffold and deploy

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::stages::deploy::deploy_project;
use crate::toolchain::Toolchain;
use solbatch_extract::{ContractExtractor, ExtractionResult};
use solbatch_scaffold::{ProjectScaffold, ProjectSynthesizer};
use solbatch_version::VersionTable;
use std::path::PathBuf;

/// What to scaffold
#[derive(Debug, Clone)]
pub struct SingleFile {
    /// Source file
    pub source: PathBuf,
    /// Contract to deploy; extracted from the source when absent
    pub contract: Option<String>,
    /// Compiler release; must be canonical
    pub release: String,
    /// Directory the project is written under
    pub output: PathBuf,
}

/// Scaffold `file` with the toolchain pinned to its release
///
/// # Errors
/// Returns `UnknownRelease` for a non-canonical release, or the toolchain,
/// extraction or synthesis failure.
pub async fn scaffold_single(
    file: &SingleFile,
    table: &VersionTable,
    toolchain: &Toolchain,
    extractor: &ContractExtractor,
    synthesizer: &ProjectSynthesizer,
) -> Result<ProjectScaffold, PipelineError> {
    if !table.is_canonical(&file.release) {
        return Err(PipelineError::UnknownRelease {
            version: file.release.clone(),
            known: table.releases().map(String::from).collect(),
        });
    }

    let lease = toolchain.lease(&file.release).await?;
    let extraction = match &file.contract {
        Some(contract) => ExtractionResult::deployable(contract.as_str()),
        None => extractor.extract(&file.source).await?,
    };
    let scaffold = synthesizer
        .synthesize(&file.source, &extraction, lease.version(), &file.output)
        .await?;
    tracing::info!(
        project = %scaffold.root.display(),
        contract = %scaffold.contract,
        release = %scaffold.version,
        "scaffolded"
    );
    Ok(scaffold)
}

/// Scaffold `file`, then deploy it on the configured development port
///
/// # Errors
/// Returns the first scaffold or deploy failure.
pub async fn run_single(
    file: &SingleFile,
    config: &PipelineConfig,
    toolchain: &Toolchain,
    extractor: &ContractExtractor,
) -> Result<ProjectScaffold, PipelineError> {
    let synthesizer = ProjectSynthesizer::new(config.network.clone(), &config.migrations_artifact);
    let scaffold = scaffold_single(file, &config.version_table(), toolchain, extractor, &synthesizer).await?;
    deploy_project(&config.deploy, &config.simulator, &scaffold.root, config.network.port).await?;
    Ok(scaffold)
}
