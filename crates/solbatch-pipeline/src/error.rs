//! Error types for pipeline stages

use solbatch_extract::ExtractionError;
use solbatch_jobs::{CheckpointError, JobError};
use solbatch_scaffold::ScaffoldError;
use std::path::PathBuf;
use std::process::ExitStatus;

/// Configuration loading failure
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("cannot read config {path}: {source}")]
    Read {
        /// File involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML of the expected shape
    #[error("invalid config {path}: {source}")]
    Parse {
        /// File involved
        path: PathBuf,
        /// Underlying TOML error
        #[source]
        source: toml::de::Error,
    },
}

/// Toolchain switch or install failure
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    /// The switch program could not be started
    #[error("cannot run {program} {action} {version}: {source}")]
    Spawn {
        /// Program invoked
        program: String,
        /// `use` or `install`
        action: &'static str,
        /// Requested version
        version: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The switch program exited non-zero
    #[error("toolchain {action} {version} failed ({status}): {stderr}")]
    Failed {
        /// `use` or `install`
        action: &'static str,
        /// Requested version
        version: String,
        /// Exit status
        status: ExitStatus,
        /// Captured standard error
        stderr: String,
    },
}

impl ToolchainError {
    /// Whether the error aborts the bucket that requested the switch
    #[inline]
    #[must_use]
    pub fn is_fatal_to_bucket(&self) -> bool {
        match self {
            Self::Spawn { action, .. } | Self::Failed { action, .. } => *action == "use",
        }
    }
}

/// Pipeline stage failure
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Configuration could not be loaded
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Toolchain could not be switched
    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    /// Job runner failed
    #[error(transparent)]
    Jobs(#[from] JobError),

    /// Contract extraction failed
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Scaffold could not be written or read
    #[error(transparent)]
    Scaffold(#[from] ScaffoldError),

    /// Filesystem operation failed
    #[error("failed to {action} {path}: {source}")]
    Io {
        /// Operation attempted
        action: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A persisted JSON structure is malformed
    #[error("corrupt state file {path}: {source}")]
    CorruptState {
        /// File involved
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Input directory is missing or not a directory
    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Requested release is not one of the canonical releases
    #[error("unsupported release {version}; expected one of {known:?}")]
    UnknownRelease {
        /// Requested release
        version: String,
        /// Canonical releases
        known: Vec<String>,
    },

    /// A deployment step could not be started
    #[error("cannot run {step}: {source}")]
    StepSpawn {
        /// Step name
        step: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A deployment step exited non-zero
    #[error("{step} failed ({status})")]
    StepFailed {
        /// Step name
        step: String,
        /// Exit status
        status: ExitStatus,
    },

    /// The chain simulator did not come up
    #[error("chain simulator on port {port} not ready: {reason}")]
    Simulator {
        /// Port requested
        port: u16,
        /// Why startup failed
        reason: String,
    },

    /// The project configuration has no port field to rewrite
    #[error("no development port in {0}")]
    MissingPort(PathBuf),

    /// `base_port + concurrency` runs past the last port
    #[error("ports {base}..{base}+{concurrency} exceed 65535")]
    PortRange {
        /// Port of slot 0
        base: u16,
        /// Number of slots
        concurrency: usize,
    },

    /// A stage command template has no program
    #[error("empty {0} command")]
    EmptyCommand(&'static str),

    /// A configured guard pattern is not a valid regular expression
    #[error("invalid guard pattern {pattern:?}: {source}")]
    InvalidPattern {
        /// Pattern text
        pattern: String,
        /// Underlying regex error
        #[source]
        source: regex::Error,
    },

    /// No guard pattern matched the source
    #[error("no safe-math guard matched in {0}")]
    NoGuards(PathBuf),

    /// A project must hold exactly one source file
    #[error("expected exactly one source in {dir}, found {found}")]
    SourceCount {
        /// Directory searched
        dir: PathBuf,
        /// Number of sources found
        found: usize,
    },
}

impl PipelineError {
    pub(crate) fn io(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { action, path, source }
    }
}

impl From<CheckpointError> for PipelineError {
    fn from(e: CheckpointError) -> Self {
        Self::Jobs(JobError::Checkpoint(e))
    }
}
