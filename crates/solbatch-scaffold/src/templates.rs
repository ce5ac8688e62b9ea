//! Deployment-framework file templates
//!
//! Generates the project configuration and migration scripts, and reads back
//! the pieces later stages need (deployed contract name, network port).

use crate::error::ScaffoldError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// File name of the project configuration
pub const CONFIG_FILE: &str = "truffle-config.js";

/// Bootstrap migration script name
pub const INITIAL_MIGRATION_FILE: &str = "1_initial_migration.js";

/// Generated deploy script name
pub const DEPLOY_MIGRATION_FILE: &str = "2_deploy_contracts.js";

/// Bootstrap migration artifact name
pub const MIGRATIONS_ARTIFACT_FILE: &str = "Migrations.json";

/// Bootstrap migration script contents
pub const INITIAL_MIGRATION: &str = r#"var Migrations = artifacts.require("Migrations");

module.exports = function(deployer) {
  deployer.deploy(Migrations);
};"#;

static DEPLOYED_VAR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"var ([a-zA-Z_$][a-zA-Z_$0-9]*) =").unwrap_or_else(|e| panic!("deploy regex: {e}"))
});

static DEV_PORT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"port:\s*\d+").unwrap_or_else(|e| panic!("port regex: {e}")));

/// Development network written into every project configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Chain-simulator host
    pub host: String,
    /// Chain-simulator port
    pub port: u16,
    /// Network id filter
    pub network_id: String,
    /// Gas limit for deployments
    pub gas: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8545,
            network_id: "*".to_string(),
            gas: 1_000_000_000,
        }
    }
}

/// Project configuration pinned to `version`
#[must_use]
pub fn config_contents(version: &str, network: &NetworkSettings) -> String {
    format!(
        r#"module.exports = {{
  networks: {{
    development: {{
      host: "{host}",
      port: {port},
      network_id: "{network_id}",
      gas: {gas}
    }}
  }},
  compilers: {{
    solc: {{
      version: "{version}",
    }}
  }}
}};"#,
        host = network.host,
        port = network.port,
        network_id = network.network_id,
        gas = network.gas,
    )
}

/// Deploy script that requires and deploys each contract with no arguments
#[must_use]
pub fn deploy_script<S: AsRef<str>>(contracts: &[S]) -> String {
    let declarations: Vec<String> = contracts
        .iter()
        .map(|c| format!("var {name} = artifacts.require(\"{name}\");", name = c.as_ref()))
        .collect();
    let calls: Vec<String> = contracts
        .iter()
        .map(|c| format!("  deployer.deploy({});", c.as_ref()))
        .collect();

    format!(
        "/* AUTO GENERATED */\n{}\n\nmodule.exports = function(deployer) {{\n{}\n}};",
        declarations.join("\n"),
        calls.join("\n"),
    )
}

/// Name of the single contract a generated deploy script deploys
///
/// # Errors
/// Returns `ScaffoldError::AmbiguousDeployScript` unless exactly one
/// `var <name> =` declaration is present.
pub fn deployed_contract(script: &str) -> Result<String, ScaffoldError> {
    let names: Vec<&str> = DEPLOYED_VAR
        .captures_iter(script)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect();

    match names.as_slice() {
        [name] => Ok((*name).to_string()),
        _ => Err(ScaffoldError::AmbiguousDeployScript { found: names.len() }),
    }
}

/// Configuration text with the development port replaced
///
/// Returns `None` if the text has no `port:` field.
#[must_use]
pub fn with_port(config: &str, port: u16) -> Option<String> {
    DEV_PORT
        .find(config)
        .map(|_| DEV_PORT.replace(config, format!("port: {port}").as_str()).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn config_pins_version_and_network() {
        let text = config_contents("0.5.16", &NetworkSettings::default());
        assert!(text.contains("version: \"0.5.16\""));
        assert!(text.contains("host: \"127.0.0.1\""));
        assert!(text.contains("port: 8545"));
        assert!(text.contains("gas: 1000000000"));
        assert!(text.starts_with("module.exports = {"));
        assert!(text.ends_with("};"));
    }

    #[test]
    fn deploy_script_for_one_contract() {
        assert_eq!(
            deploy_script(&["Token"]),
            "/* AUTO GENERATED */\nvar Token = artifacts.require(\"Token\");\n\nmodule.exports = function(deployer) {\n  deployer.deploy(Token);\n};"
        );
    }

    #[test]
    fn deployed_contract_reads_back_generated_script() {
        assert_eq!(deployed_contract(&deploy_script(&["Crowdsale"])).unwrap(), "Crowdsale");
    }

    #[test]
    fn deployed_contract_rejects_multiple_declarations() {
        let script = deploy_script(&["A", "B"]);
        assert!(matches!(
            deployed_contract(&script),
            Err(ScaffoldError::AmbiguousDeployScript { found: 2 })
        ));
        assert!(deployed_contract("module.exports = 1;").is_err());
    }

    #[test]
    fn port_rewrite() {
        let text = config_contents("0.4.26", &NetworkSettings::default());
        let rewritten = with_port(&text, 8551).unwrap();
        assert!(rewritten.contains("port: 8551"));
        assert!(!rewritten.contains("port: 8545"));
        assert!(with_port("module.exports = {};", 1).is_none());
    }
}
