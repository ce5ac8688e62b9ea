//! Deployment-framework project synthesis
//!
//! Wraps one extracted contract into a self-contained project pinned to a
//! resolved compiler release.

pub mod error;
pub mod synthesizer;
pub mod templates;

pub use error::ScaffoldError;
pub use synthesizer::{ProjectScaffold, ProjectSynthesizer};
pub use templates::{
    config_contents, deploy_script, deployed_contract, with_port, NetworkSettings, CONFIG_FILE,
    DEPLOY_MIGRATION_FILE,
};
