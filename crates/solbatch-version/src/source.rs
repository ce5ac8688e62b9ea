//! Source units discovered by a corpus scan

use crate::error::{ParseError, SourceError};
use crate::pragma::pragma_constraints;
use crate::resolver::{resolve, ResolvedVersion};
use std::path::{Path, PathBuf};

/// One contract source file with its raw pragma constraints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceUnit {
    /// Path of the file
    pub path: PathBuf,
    /// Raw file text (lossy UTF-8)
    pub text: String,
    /// Raw constraint strings, in document order
    pub constraints: Vec<String>,
}

impl SourceUnit {
    /// Build a unit from in-memory text
    #[must_use]
    pub fn from_text(path: impl Into<PathBuf>, text: impl Into<String>) -> Self {
        let text = text.into();
        let constraints = pragma_constraints(&text);
        Self {
            path: path.into(),
            text,
            constraints,
        }
    }

    /// Read a unit from disk
    ///
    /// # Errors
    /// Returns `SourceError::Read` if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let bytes = std::fs::read(path).map_err(|source| SourceError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_text(path, String::from_utf8_lossy(&bytes)))
    }

    /// File name used as the bucket member key
    #[must_use]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Resolve this unit's compiler version
    ///
    /// # Errors
    /// Returns `ParseError` if any pragma constraint is malformed.
    pub fn resolve(&self) -> Result<ResolvedVersion, ParseError> {
        resolve(&self.constraints)
    }
}
