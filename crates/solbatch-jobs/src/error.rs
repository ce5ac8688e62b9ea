//! Error types for the job runner

use crate::state::JobStatus;
use std::path::PathBuf;

/// Checkpoint persistence failure
#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    /// Reading or writing a checkpoint file failed
    #[error("checkpoint I/O on {path}: {source}")]
    Io {
        /// File involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A checkpoint file is not valid JSON of the expected shape
    #[error("corrupt checkpoint {path}: {source}")]
    Corrupt {
        /// File involved
        path: PathBuf,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

/// Job runner failure
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// A status transition would regress or skip a state
    #[error("illegal transition for {key}: {from} -> {to}")]
    IllegalTransition {
        /// Item key
        key: String,
        /// Current status
        from: JobStatus,
        /// Requested status
        to: JobStatus,
    },

    /// A result arrived for an item that was never dispatched
    #[error("unknown item {0}")]
    UnknownItem(String),

    /// Concurrency width must be at least one
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    /// Checkpoint persistence failed
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),
}
