//! External compiler invocation
//!
//! The compiler is run as an isolated subprocess per output mode. Its stdout
//! may wrap the JSON payload in banner text, so the payload is taken as the
//! substring between the first `{` and the last `}`.

use crate::error::CompilationFailed;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Compiler output mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputMode {
    /// Structural tree (AST) dump
    StructuralTree,
    /// Interface (ABI) listing
    Interface,
}

/// Source of compiler JSON output
#[async_trait::async_trait]
pub trait Compiler: Send + Sync {
    /// Run the compiler on `source` and return the JSON payload text
    async fn invoke(&self, mode: OutputMode, source: &Path) -> Result<String, CompilationFailed>;
}

/// Payload between the first `{` and the last `}` of `stdout`
#[must_use]
pub fn json_payload(stdout: &str) -> Option<&str> {
    let start = stdout.find('{')?;
    let end = stdout.rfind('}')?;
    (start <= end).then(|| &stdout[start..=end])
}

/// Command-line settings for the compiler binary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerSettings {
    /// Compiler program
    pub program: PathBuf,
    /// Arguments selecting the structural-tree mode
    pub structural_args: Vec<String>,
    /// Arguments selecting the interface mode
    pub interface_args: Vec<String>,
}

impl Default for CompilerSettings {
    fn default() -> Self {
        Self {
            program: PathBuf::from("solc"),
            structural_args: vec!["--ast-json".to_string()],
            interface_args: vec!["--combined-json".to_string(), "abi".to_string()],
        }
    }
}

/// `solc` invoked as a subprocess
#[derive(Debug, Clone, Default)]
pub struct Solc {
    settings: CompilerSettings,
}

impl Solc {
    /// Create from settings
    #[inline]
    #[must_use]
    pub fn new(settings: CompilerSettings) -> Self {
        Self { settings }
    }

    fn mode_args(&self, mode: OutputMode) -> &[String] {
        match mode {
            OutputMode::StructuralTree => &self.settings.structural_args,
            OutputMode::Interface => &self.settings.interface_args,
        }
    }
}

#[async_trait::async_trait]
impl Compiler for Solc {
    async fn invoke(&self, mode: OutputMode, source: &Path) -> Result<String, CompilationFailed> {
        let source = tokio::fs::canonicalize(source)
            .await
            .unwrap_or_else(|_| source.to_path_buf());
        tracing::debug!(?mode, source = %source.display(), "invoking compiler");

        let output = Command::new(&self.settings.program)
            .args(self.mode_args(mode))
            .arg(&source)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| CompilationFailed::Spawn {
                program: self.settings.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(CompilationFailed::NonZeroExit {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        json_payload(&stdout)
            .map(str::to_string)
            .ok_or(CompilationFailed::EmptyPayload)
    }
}
