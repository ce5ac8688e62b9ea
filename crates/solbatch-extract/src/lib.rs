//! Canonical-contract extraction
//!
//! Invokes an external compiler in two output modes and selects the
//! deployable contract of a source file:
//! - **Structural tree**: last contract definition in document order
//! - **Interface**: the selected contract's constructor must take no arguments

pub mod abi;
pub mod ast;
pub mod compiler;
pub mod error;
pub mod extractor;

pub use abi::{AbiEntry, AbiParam, ConstructorShape, InterfaceListing};
pub use ast::{find_contracts, select_canonical, ContractDefinition};
pub use compiler::{json_payload, Compiler, CompilerSettings, OutputMode, Solc};
pub use error::{CompilationFailed, ExtractionError, ExtractionReason};
pub use extractor::{ContractExtractor, ExtractionResult};
