//! Error types for contract extraction

use std::process::ExitStatus;

/// External compiler invocation failure
#[derive(Debug, thiserror::Error)]
pub enum CompilationFailed {
    /// The compiler process could not be started
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The compiler exited non-zero
    #[error("compiler exited with {status}: {stderr}")]
    NonZeroExit {
        /// Exit status
        status: ExitStatus,
        /// Captured diagnostic output
        stderr: String,
    },

    /// The compiler printed no JSON payload
    #[error("empty stdout")]
    EmptyPayload,
}

/// Why extraction rejected a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtractionReason {
    /// AST invocation or analysis failed
    StructuralAnalysisFailed,
    /// ABI invocation or analysis failed
    InterfaceAnalysisFailed,
    /// Selected contract's constructor takes arguments
    ConstructorArgsUnsupported,
}

/// Extraction failure, recorded per file and never fatal to a batch
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// AST invocation or analysis failed
    #[error("AST: {0}")]
    StructuralAnalysisFailed(String),

    /// ABI invocation or analysis failed
    #[error("ABI: {0}")]
    InterfaceAnalysisFailed(String),

    /// Selected contract's constructor takes arguments
    #[error("constructor of {contract} requires {inputs} argument(s)")]
    ConstructorArgsUnsupported {
        /// Selected contract
        contract: String,
        /// Number of constructor inputs
        inputs: usize,
    },
}

impl ExtractionError {
    /// Reason tag for this failure
    #[inline]
    #[must_use]
    pub fn reason(&self) -> ExtractionReason {
        match self {
            Self::StructuralAnalysisFailed(_) => ExtractionReason::StructuralAnalysisFailed,
            Self::InterfaceAnalysisFailed(_) => ExtractionReason::InterfaceAnalysisFailed,
            Self::ConstructorArgsUnsupported { .. } => ExtractionReason::ConstructorArgsUnsupported,
        }
    }
}
