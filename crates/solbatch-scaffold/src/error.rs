//! Error types for project synthesis

use std::path::PathBuf;

/// Project synthesis failure, fatal only to the item being synthesized
#[derive(Debug, thiserror::Error)]
pub enum ScaffoldError {
    /// A filesystem operation failed
    #[error("{action} {path}: {source}")]
    Filesystem {
        /// What was being done
        action: &'static str,
        /// Path involved
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A deploy script did not declare exactly one contract
    #[error("deploy script declares {found} contracts, expected exactly one")]
    AmbiguousDeployScript {
        /// Number of declarations found
        found: usize,
    },

    /// The source path has no usable file name
    #[error("source path {0} has no file name")]
    InvalidSource(PathBuf),
}

impl ScaffoldError {
    pub(crate) fn fs(action: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> Self {
        let path = path.into();
        move |source| Self::Filesystem {
            action,
            path,
            source,
        }
    }
}
