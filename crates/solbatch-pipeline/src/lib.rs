//! Corpus-to-project pipeline
//!
//! Ties version resolution, contract extraction, project synthesis and the
//! checkpointed job runner into the stages of the `solbatch` tool:
//!
//! - [`batch`]: bucket a corpus by compiler release and scaffold every file
//! - [`stages::deploy_all`]: deploy every scaffold against a private chain
//! - [`stages::train`]: generate fuzzer training data per deployed project
//! - [`stages::safemath`]: comment out overflow guards and recompile
//! - [`stages::single`]: scaffold and deploy one file
//!
//! Every per-item stage records outcomes in its own checkpoint under the
//! state directory, so an interrupted stage resumes where it stopped.

pub mod batch;
pub mod config;
pub mod error;
pub mod simulator;
pub mod snapshot;
pub mod stages;
pub mod telemetry;
pub mod toolchain;

pub use batch::{BatchCoordinator, BatchOptions, BatchReport, Bucketing};
pub use config::PipelineConfig;
pub use error::{ConfigError, PipelineError, ToolchainError};
pub use stages::StageOptions;
pub use telemetry::init_tracing;
pub use toolchain::{SolcSelect, Toolchain, ToolchainLease, ToolchainSwitch};
