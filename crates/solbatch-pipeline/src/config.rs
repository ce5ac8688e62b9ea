//! Pipeline configuration
//!
//! Loaded from an optional TOML file; every field has a default and unknown
//! keys are ignored. Command-line flags override individual fields after
//! loading.
//!
//! ```toml
//! state_dir = "/var/tmp/solbatch"
//! concurrency = 8
//!
//! [toolchain]
//! program = "solc-select"
//!
//! [releases]
//! "4" = "0.4.26"
//! "5" = "0.5.16"
//! "6" = "0.6.11"
//! ```

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use solbatch_extract::CompilerSettings;
use solbatch_scaffold::NetworkSettings;
use solbatch_version::VersionTable;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Sources known to crash the compiler (not Solidity)
const IGNORED_FILES: [&str; 6] = [
    "0xc0a47dfe034b400b47bdad5fecda2621de6c4d95.sol",
    "0xe75fa140f7c05077e05ffa0a9db227e32c80d5da.sol",
    "0xf6e8c835d43895cbf8cba18bdfcb348d7fd2cc58.sol",
    "0x2eb1e8fd394222df25638cfa8f0e5e7998a9dc1f.sol",
    "0x44d2142f6f3686c5ca7dbdd7c9d8882c630a0b86.sol",
    "0xa0cc94083c43a027071f6ccaee7251fbd818b7c6.sol",
];

const INSTALL_VERSIONS: [&str; 35] = [
    "0.4.4", "0.4.6", "0.4.8", "0.4.9", "0.4.10", "0.4.11", "0.4.12", "0.4.13", "0.4.14",
    "0.4.15", "0.4.16", "0.4.17", "0.4.18", "0.4.19", "0.4.20", "0.4.21", "0.4.22", "0.4.23",
    "0.4.24", "0.4.25", "0.4.26", "0.5.0", "0.5.1", "0.5.2", "0.5.3", "0.5.4", "0.5.5", "0.5.6",
    "0.5.7", "0.5.8", "0.5.9", "0.5.10", "0.5.16", "0.6.0", "0.6.11",
];

const SIMULATOR_ACCOUNTS: [&str; 5] = [
    "1c6dbb1fe61bbb7c256f0ffcbd34087e211173dbc8454220b8b166ed6ada5c00",
    "b1cff43bf95333788b080b6cd5c5e2fcbe321ccd4132ed80cb3e72478c69e9a7",
    "aa3eeb453426d9c9292f89be5fa7e6caa0330d312255f84c0caa6764ae1adf00",
    "34a5a824b045c9ce797589d334394c11ee28d9cd8757f1a9b0ccf0fd0008c641",
    "a7a163dcb33958498cf5736282f53e39bd6cb7a58f5d4a948445dc86faa34f90",
];

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

/// Complete pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding checkpoints and bucket snapshots
    pub state_dir: PathBuf,
    /// Default worker-pool width
    pub concurrency: usize,
    /// Recorded outcomes between checkpoint flushes
    pub flush_every: usize,
    /// Compiler invocation
    pub compiler: CompilerSettings,
    /// Toolchain switch and install
    pub toolchain: ToolchainSettings,
    /// Canonical "latest patch" release per minor, keyed by minor
    pub releases: BTreeMap<String, String>,
    /// Corpus file names skipped during bucketing
    pub ignored_files: Vec<String>,
    /// Development network written into scaffolds
    pub network: NetworkSettings,
    /// Pre-built bootstrap migration artifact copied into scaffolds
    pub migrations_artifact: PathBuf,
    /// Chain simulator
    pub simulator: SimulatorSettings,
    /// Deployment framework and the per-project deploy stage
    pub deploy: DeploySettings,
    /// Training-data stage
    pub train: TrainSettings,
    /// Guard-stripping stage
    pub safemath: SafemathSettings,
    /// Command used to open the failure map, followed by its path
    pub failure_viewer: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            state_dir: std::env::temp_dir().join("solbatch"),
            concurrency: 8,
            flush_every: solbatch_jobs::DEFAULT_FLUSH_EVERY,
            compiler: CompilerSettings::default(),
            toolchain: ToolchainSettings::default(),
            releases: BTreeMap::from([
                ("4".to_string(), "0.4.26".to_string()),
                ("5".to_string(), "0.5.16".to_string()),
                ("6".to_string(), "0.6.11".to_string()),
            ]),
            ignored_files: strings(&IGNORED_FILES),
            network: NetworkSettings::default(),
            migrations_artifact: PathBuf::from("crates/solbatch-scaffold/fixtures/Migrations.json"),
            simulator: SimulatorSettings::default(),
            deploy: DeploySettings::default(),
            train: TrainSettings::default(),
            safemath: SafemathSettings::default(),
            failure_viewer: strings(&["code", "-r"]),
        }
    }
}

impl PipelineConfig {
    /// Load from `path`, or defaults when `path` is `None`
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// Returns the TOML error if the text is malformed.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Release table built from `releases`; entries with a non-numeric key
    /// are skipped with a warning
    #[must_use]
    pub fn version_table(&self) -> VersionTable {
        VersionTable::new(self.releases.iter().filter_map(|(minor, release)| {
            match minor.trim().parse::<u32>() {
                Ok(minor) => Some((minor, release.clone())),
                Err(_) => {
                    tracing::warn!(key = %minor, "ignoring release entry with non-numeric minor");
                    None
                }
            }
        }))
    }
}

/// Toolchain switch program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainSettings {
    /// Switch program
    pub program: String,
    /// Arguments before the version to make it active
    pub use_args: Vec<String>,
    /// Arguments before the version to install it
    pub install_args: Vec<String>,
    /// Versions installed by `toolchain-install`
    pub install_versions: Vec<String>,
}

impl Default for ToolchainSettings {
    fn default() -> Self {
        Self {
            program: "solc-select".to_string(),
            use_args: strings(&["use"]),
            install_args: strings(&["install"]),
            install_versions: strings(&INSTALL_VERSIONS),
        }
    }
}

/// Chain simulator process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    /// Simulator program
    pub program: String,
    /// Pre-funded account private keys (hex, no prefix)
    pub accounts: Vec<String>,
    /// Balance given to every account, in wei
    pub balance: String,
    /// Block gas limit
    pub gas_limit: String,
    /// How long to wait for the port to accept connections
    pub startup_timeout_ms: u64,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            program: "ganache-cli".to_string(),
            accounts: strings(&SIMULATOR_ACCOUNTS),
            balance: "100000000000000000000000000000".to_string(),
            gas_limit: "0xfffffffffff".to_string(),
            startup_timeout_ms: 30_000,
        }
    }
}

/// Deployment framework and the `deploy-all` stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    /// Deployment framework program
    pub framework: String,
    /// Script run with `<framework> exec` after deployment
    pub extraction_script: PathBuf,
    /// Port of slot 0; slot `n` uses `base_port + n`
    pub base_port: u16,
    /// Per-project command with `{project}` and `{port}` placeholders;
    /// empty means this binary's own `deploy` subcommand
    pub command: Vec<String>,
}

impl Default for DeploySettings {
    fn default() -> Self {
        Self {
            framework: "truffle".to_string(),
            extraction_script: PathBuf::from("extract.js"),
            base_port: 8545,
            command: Vec::new(),
        }
    }
}

/// Training-data stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainSettings {
    /// Fuzzer command with `{project}`, `{contract}` and `{dataset}` placeholders
    pub command: Vec<String>,
    /// Worker-pool width
    pub concurrency: usize,
}

impl Default for TrainSettings {
    fn default() -> Self {
        Self {
            command: strings(&[
                "python3",
                "-m",
                "ilf",
                "--proj",
                "{project}",
                "--contract",
                "{contract}",
                "--limit",
                "2000",
                "--fuzzer",
                "symbolic",
                "--dataset_dump_path",
                "{dataset}",
            ]),
            concurrency: 1,
        }
    }
}

/// Guard-stripping stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafemathSettings {
    /// Candidate guard patterns; each must have one capture group
    pub patterns: Vec<String>,
    /// Only projects whose directory name starts with this prefix
    pub prefix: Option<String>,
}

impl Default for SafemathSettings {
    fn default() -> Self {
        Self {
            patterns: strings(&[
                r"(assert\(b <= a[^;]*?;)",
                r"(require\(b <= a,[^;]*?;)",
                r"(assert\(c >= a[^;]*?;)",
                r"(require\(c >= a[^;]*?;)",
            ]),
            prefix: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_file_is_all_defaults() {
        assert_eq!(PipelineConfig::from_toml("").unwrap(), PipelineConfig::default());
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            concurrency = 3
            unknown_key = "ignored"

            [network]
            port = 9000

            [toolchain]
            program = "/opt/bin/solc-select"
            "#,
        )
        .unwrap();

        assert_eq!(config.concurrency, 3);
        assert_eq!(config.network.port, 9000);
        assert_eq!(config.network.host, "127.0.0.1");
        assert_eq!(config.toolchain.program, "/opt/bin/solc-select");
        assert_eq!(config.toolchain.use_args, vec!["use".to_string()]);
        assert_eq!(config.simulator.accounts.len(), 5);
    }

    #[test]
    fn release_table_from_string_keys() {
        let config = PipelineConfig::from_toml(
            r#"
            [releases]
            "4" = "0.4.24"
            "7" = "0.7.6"
            "x" = "0.0.0"
            "#,
        )
        .unwrap();
        let table = config.version_table();
        assert_eq!(table.releases().collect::<Vec<_>>(), ["0.4.24", "0.7.6"]);
    }

    #[test]
    fn default_table_matches_resolver_default() {
        assert_eq!(PipelineConfig::default().version_table(), VersionTable::default());
    }

    #[test]
    fn load_reports_missing_and_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            PipelineConfig::load(Some(&dir.path().join("missing.toml"))),
            Err(ConfigError::Read { .. })
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "concurrency = \"many\"").unwrap();
        assert!(matches!(PipelineConfig::load(Some(&bad)), Err(ConfigError::Parse { .. })));

        assert_eq!(PipelineConfig::load(None).unwrap(), PipelineConfig::default());
    }
}
