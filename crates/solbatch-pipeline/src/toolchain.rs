//! Process-wide compiler toolchain selection
//!
//! The active compiler version is global state outside this process. Access
//! goes through [`Toolchain::lease`], which holds an exclusive lock for as
//! long as the returned [`ToolchainLease`] lives; a second lease for any
//! version waits until the first is dropped.

use crate::config::ToolchainSettings;
use crate::error::ToolchainError;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::{Mutex, MutexGuard};

/// Mutates the process-wide compiler selection
#[async_trait]
pub trait ToolchainSwitch: Send + Sync {
    /// Make `version` the active compiler
    async fn activate(&self, version: &str) -> Result<(), ToolchainError>;

    /// Install `version` so it can later be activated
    async fn install(&self, version: &str) -> Result<(), ToolchainError>;
}

/// `solc-select`-style switch program
#[derive(Debug, Clone, Default)]
pub struct SolcSelect {
    settings: ToolchainSettings,
}

impl SolcSelect {
    /// Create from settings
    #[inline]
    #[must_use]
    pub fn new(settings: ToolchainSettings) -> Self {
        Self { settings }
    }

    async fn call(&self, action: &'static str, args: &[String], version: &str) -> Result<(), ToolchainError> {
        tracing::debug!(program = %self.settings.program, action, version, "running toolchain command");
        let output = Command::new(&self.settings.program)
            .args(args)
            .arg(version)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| ToolchainError::Spawn {
                program: self.settings.program.clone(),
                action,
                version: version.to_string(),
                source,
            })?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ToolchainError::Failed {
                action,
                version: version.to_string(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl ToolchainSwitch for SolcSelect {
    async fn activate(&self, version: &str) -> Result<(), ToolchainError> {
        self.call("use", &self.settings.use_args, version).await
    }

    async fn install(&self, version: &str) -> Result<(), ToolchainError> {
        self.call("install", &self.settings.install_args, version).await
    }
}

/// Exclusive handle on the active toolchain
pub struct Toolchain {
    switch: Arc<dyn ToolchainSwitch>,
    active: Mutex<Option<String>>,
}

impl std::fmt::Debug for Toolchain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Toolchain").finish_non_exhaustive()
    }
}

/// Proof that the toolchain is pinned to one version
///
/// Work that depends on the active compiler must run while the lease is
/// held. Dropping the lease lets the next bucket switch.
#[derive(Debug)]
pub struct ToolchainLease<'a> {
    guard: MutexGuard<'a, Option<String>>,
}

impl ToolchainLease<'_> {
    /// Version pinned by this lease
    #[must_use]
    pub fn version(&self) -> &str {
        self.guard.as_deref().unwrap_or_default()
    }
}

impl Toolchain {
    /// Create over a switch; no version is assumed active
    #[must_use]
    pub fn new(switch: Arc<dyn ToolchainSwitch>) -> Self {
        Self {
            switch,
            active: Mutex::new(None),
        }
    }

    /// Wait for exclusive access and pin `version`
    ///
    /// The switch command runs only when `version` differs from the version
    /// activated by the previous lease.
    ///
    /// # Errors
    /// Returns `ToolchainError` if the switch fails; nothing is then
    /// considered active.
    pub async fn lease(&self, version: &str) -> Result<ToolchainLease<'_>, ToolchainError> {
        let mut guard = self.active.lock().await;
        if guard.as_deref() != Some(version) {
            *guard = None;
            self.switch.activate(version).await?;
            tracing::info!(version, "toolchain switched");
            *guard = Some(version.to_string());
        }
        Ok(ToolchainLease { guard })
    }

    /// Install every version in `versions`, returning the failures
    pub async fn install_all<S: AsRef<str>>(&self, versions: &[S]) -> Vec<(String, ToolchainError)> {
        let _exclusive = self.active.lock().await;
        let mut failed = Vec::new();
        for version in versions {
            let version = version.as_ref();
            match self.switch.install(version).await {
                Ok(()) => tracing::info!(version, "toolchain installed"),
                Err(e) => {
                    tracing::warn!(version, error = %e, "toolchain install failed");
                    failed.push((version.to_string(), e));
                }
            }
        }
        failed
    }
}
