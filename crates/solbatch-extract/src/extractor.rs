//! Canonical-contract extraction
//!
//! Runs the compiler in both output modes, selects the last contract
//! definition as the deployable one, and rejects it if its constructor
//! takes arguments.

use crate::abi::{ConstructorShape, InterfaceListing};
use crate::ast::select_canonical;
use crate::compiler::{Compiler, OutputMode};
use crate::error::ExtractionError;
use std::path::Path;
use std::sync::Arc;

/// The selected deployable contract of one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Selected contract name
    pub contract: String,
    /// Constructor shape (never `WithArgs` on success)
    pub constructor: ConstructorShape,
}

impl ExtractionResult {
    /// Result for a contract known to deploy without arguments
    #[inline]
    #[must_use]
    pub fn deployable(contract: impl Into<String>) -> Self {
        Self {
            contract: contract.into(),
            constructor: ConstructorShape::Absent,
        }
    }
}

/// Extracts the canonical contract from a source file
#[derive(Clone)]
pub struct ContractExtractor {
    compiler: Arc<dyn Compiler>,
}

impl std::fmt::Debug for ContractExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContractExtractor").finish_non_exhaustive()
    }
}

impl ContractExtractor {
    /// Create with a compiler backend
    #[inline]
    #[must_use]
    pub fn new(compiler: Arc<dyn Compiler>) -> Self {
        Self { compiler }
    }

    /// Extract the canonical contract of `source`
    ///
    /// # Errors
    /// - `StructuralAnalysisFailed` if the AST run fails or holds no contract
    /// - `InterfaceAnalysisFailed` if the ABI run fails or lacks the contract
    /// - `ConstructorArgsUnsupported` if the constructor takes arguments
    pub async fn extract(&self, source: &Path) -> Result<ExtractionResult, ExtractionError> {
        let (structural, interface) = tokio::join!(
            self.compiler.invoke(OutputMode::StructuralTree, source),
            self.compiler.invoke(OutputMode::Interface, source),
        );

        let structural =
            structural.map_err(|e| ExtractionError::StructuralAnalysisFailed(e.to_string()))?;
        let ast: serde_json::Value = serde_json::from_str(&structural)
            .map_err(|e| ExtractionError::StructuralAnalysisFailed(format!("unparseable AST: {e}")))?;
        let canonical = select_canonical(&ast).ok_or_else(|| {
            ExtractionError::StructuralAnalysisFailed("no contract definitions".to_string())
        })?;

        let interface =
            interface.map_err(|e| ExtractionError::InterfaceAnalysisFailed(e.to_string()))?;
        let listing = InterfaceListing::parse(&interface)
            .map_err(|e| ExtractionError::InterfaceAnalysisFailed(format!("unparseable ABI: {e}")))?;
        let entries = listing.for_contract(&canonical.name).ok_or_else(|| {
            ExtractionError::InterfaceAnalysisFailed(format!("no ABI for {}", canonical.name))
        })?;

        let constructor = ConstructorShape::of(entries);
        if let ConstructorShape::WithArgs(inputs) = constructor {
            return Err(ExtractionError::ConstructorArgsUnsupported {
                contract: canonical.name,
                inputs,
            });
        }

        tracing::debug!(contract = %canonical.name, ?constructor, "selected canonical contract");
        Ok(ExtractionResult {
            contract: canonical.name,
            constructor,
        })
    }
}
