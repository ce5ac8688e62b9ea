//! Work-item executors
//!
//! A [`Worker`] turns one item key into an [`Outcome`]. Workers never touch
//! the checkpoint; the runner records whatever they return.

use async_trait::async_trait;
use std::future::Future;
use std::process::Stdio;
use tokio::process::Command;

/// Result of processing one item
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The item succeeded
    Succeeded,
    /// The item failed, with diagnostic detail
    Failed(String),
}

impl Outcome {
    /// Failure with `detail`
    #[inline]
    #[must_use]
    pub fn failed(detail: impl Into<String>) -> Self {
        Self::Failed(detail.into())
    }

    /// Whether this is `Succeeded`
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl<E: std::fmt::Display> From<Result<(), E>> for Outcome {
    fn from(result: Result<(), E>) -> Self {
        match result {
            Ok(()) => Self::Succeeded,
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

/// Processes one work item
///
/// `slot` is the index of the concurrency slot running the item, in
/// `0..concurrency`. No two in-flight items share a slot, so workers may
/// derive exclusive resources (such as a network port) from it.
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// Process `item`
    async fn run(&self, item: &str, slot: usize) -> Outcome;
}

/// Worker that runs one external command per item
///
/// The outcome is decided by exit status alone. On failure the detail is the
/// trimmed standard error, or the exit status if stderr was empty.
pub struct CommandWorker<F> {
    build: F,
}

impl<F> std::fmt::Debug for CommandWorker<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandWorker").finish_non_exhaustive()
    }
}

impl<F> CommandWorker<F>
where
    F: Fn(&str, usize) -> Command + Send + Sync + 'static,
{
    /// Create from a command builder called once per item
    #[inline]
    #[must_use]
    pub fn new(build: F) -> Self {
        Self { build }
    }
}

#[async_trait]
impl<F> Worker for CommandWorker<F>
where
    F: Fn(&str, usize) -> Command + Send + Sync + 'static,
{
    async fn run(&self, item: &str, slot: usize) -> Outcome {
        let mut command = (self.build)(item, slot);
        run_command(&mut command).await
    }
}

/// Run `command` to completion and classify it by exit status
///
/// The child gets its own process group on unix, so a terminal interrupt
/// reaches only this process; it is killed if the future is dropped.
pub async fn run_command(command: &mut Command) -> Outcome {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    command.process_group(0);

    let output = match command.output().await {
        Ok(output) => output,
        Err(e) => return Outcome::failed(format!("failed to spawn: {e}")),
    };
    if output.status.success() {
        return Outcome::Succeeded;
    }

    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        Outcome::failed(output.status.to_string())
    } else {
        Outcome::failed(stderr)
    }
}

/// Worker backed by an async closure
pub struct FnWorker<F> {
    f: F,
}

impl<F> std::fmt::Debug for FnWorker<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnWorker").finish_non_exhaustive()
    }
}

impl<F, Fut> FnWorker<F>
where
    F: Fn(String, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    /// Wrap `f`
    #[inline]
    #[must_use]
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Worker for FnWorker<F>
where
    F: Fn(String, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Outcome> + Send + 'static,
{
    async fn run(&self, item: &str, slot: usize) -> Outcome {
        (self.f)(item.to_string(), slot).await
    }
}
