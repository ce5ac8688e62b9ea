//! Resumable, bounded-concurrency job runner
//!
//! Drives a per-item [`Worker`] over a set of item keys, recording each
//! terminal outcome in a durable [`Checkpoint`]. Re-running over the same
//! items dispatches only those with no recorded outcome.
//!
//! ```rust,no_run
//! use solbatch_jobs::{CancelToken, CheckpointStore, FnWorker, JobRunner, Outcome};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), solbatch_jobs::JobError> {
//! let runner = JobRunner::new(CheckpointStore::new(Path::new("state"), "deploy"), 4)?;
//! let (token, signal) = CancelToken::new();
//! token.cancel_on_ctrl_c();
//! let worker = Arc::new(FnWorker::new(|_item: String, _slot: usize| async { Outcome::Succeeded }));
//! let summary = runner.run_all(vec!["a".to_string()], worker, signal).await?;
//! println!("{} succeeded", summary.succeeded);
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod checkpoint;
pub mod error;
pub mod runner;
pub mod state;
pub mod worker;

pub use cancel::{CancelSignal, CancelToken};
pub use checkpoint::{Checkpoint, CheckpointStore};
pub use error::{CheckpointError, JobError};
pub use runner::{JobRunner, RunSummary, DEFAULT_FLUSH_EVERY};
pub use state::{is_allowed, JobRecord, JobStatus};
pub use worker::{run_command, CommandWorker, FnWorker, Outcome, Worker};
