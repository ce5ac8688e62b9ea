//! Error types for version resolution

/// Malformed version-constraint text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// No `[comparator] major.minor[.patch]` clause found
    #[error("no version clause in constraint {input:?}")]
    NoClause {
        /// The offending constraint text
        input: String,
    },

    /// A numeric component does not fit the version range
    #[error("version component {component:?} out of range in {input:?}")]
    ComponentOutOfRange {
        /// The digits that failed to convert
        component: String,
        /// The offending constraint text
        input: String,
    },
}

/// Failure to load a source unit from disk
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// Reading the file failed
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that could not be read
        path: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}
