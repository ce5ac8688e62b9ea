//! Testing utilities for the solbatch workspace
//!
//! Sample Solidity sources, compiler-output builders, and an in-memory
//! compiler keyed by source file name.

#![allow(missing_docs)]

use serde_json::{json, Value};
use solbatch_extract::{CompilationFailed, Compiler, OutputMode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const TOKEN_SOL: &str = r#"pragma solidity ^0.4.24;

library SafeMath {
    function add(uint256 a, uint256 b) internal pure returns (uint256) {
        uint256 c = a + b;
        require(c >= a);
        return c;
    }
}

contract Token {
    using SafeMath for uint256;
    mapping(address => uint256) balances;

    function transfer(address to, uint256 value) public returns (bool) {
        balances[to] = balances[to].add(value);
        return true;
    }
}
"#;

pub const CROWDSALE_SOL: &str = r#"pragma solidity >=0.5.1 <0.6.0;

contract Crowdsale {
    uint256 public raised;

    function buy() public payable {
        raised += msg.value;
    }
}
"#;

pub const PINNED_SOL: &str = r#"pragma solidity 0.4.25;

contract Pinned {
    function ping() public pure returns (uint256) { return 1; }
}
"#;

pub const NO_PRAGMA_SOL: &str = "contract Bare {}\n";

pub const MALFORMED_PRAGMA_SOL: &str = "pragma solidity latest;\ncontract Odd {}\n";

/// Legacy (`--ast-json`) tree with one contract definition per name
#[must_use]
pub fn legacy_ast(contracts: &[&str]) -> Value {
    let children: Vec<Value> = contracts
        .iter()
        .map(|name| {
            json!({
                "name": "ContractDefinition",
                "attributes": {"name": name, "contractKind": "contract", "fullyImplemented": true},
                "children": []
            })
        })
        .collect();
    json!({"name": "SourceUnit", "attributes": {"absolutePath": "a.sol"}, "children": children})
}

/// Compact (`nodeType`) tree with one contract definition per name
#[must_use]
pub fn compact_ast(contracts: &[&str]) -> Value {
    let nodes: Vec<Value> = contracts
        .iter()
        .map(|name| json!({"nodeType": "ContractDefinition", "name": name, "nodes": []}))
        .collect();
    json!({"nodeType": "SourceUnit", "nodes": nodes})
}

/// Constructor ABI entry taking `inputs` uint256 arguments
#[must_use]
pub fn constructor(inputs: usize) -> Value {
    let params: Vec<Value> = (0..inputs)
        .map(|i| json!({"name": format!("arg{i}"), "type": "uint256"}))
        .collect();
    json!({"type": "constructor", "inputs": params, "stateMutability": "nonpayable"})
}

/// Combined-JSON interface listing for `source`
///
/// With `encoded` set, each ABI is embedded as a JSON string, the way
/// older compilers emit it.
#[must_use]
pub fn combined_abi(source: &str, contracts: &[(&str, Vec<Value>)], encoded: bool) -> Value {
    let map: serde_json::Map<String, Value> = contracts
        .iter()
        .map(|(name, abi)| {
            let abi = Value::Array(abi.clone());
            let abi = if encoded { Value::String(abi.to_string()) } else { abi };
            (format!("{source}:{name}"), json!({"abi": abi}))
        })
        .collect();
    json!({"contracts": map, "version": "0.4.26+commit.4563c3fc"})
}

#[derive(Debug, Clone)]
struct Canned {
    ast: Option<String>,
    abi: Option<String>,
}

/// In-memory compiler keyed by source file name
///
/// Unknown files fail both modes with `EmptyPayload`.
#[derive(Debug, Default)]
pub struct FakeCompiler {
    outputs: HashMap<String, Canned>,
    calls: Mutex<Vec<(OutputMode, PathBuf)>>,
}

impl FakeCompiler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// `file` defines `contracts`, none with a constructor
    #[must_use]
    pub fn with_contracts(self, file: &str, contracts: &[&str]) -> Self {
        let abi: Vec<(&str, Vec<Value>)> = contracts.iter().map(|c| (*c, Vec::new())).collect();
        self.with_outputs(
            file,
            Some(legacy_ast(contracts).to_string()),
            Some(combined_abi(file, &abi, false).to_string()),
        )
    }

    /// `file` defines one contract whose constructor takes `inputs` arguments
    #[must_use]
    pub fn with_constructor(self, file: &str, contract: &str, inputs: usize) -> Self {
        self.with_outputs(
            file,
            Some(legacy_ast(&[contract]).to_string()),
            Some(combined_abi(file, &[(contract, vec![constructor(inputs)])], true).to_string()),
        )
    }

    /// `file` fails to compile in both modes
    #[must_use]
    pub fn failing(self, file: &str) -> Self {
        self.with_outputs(file, None, None)
    }

    /// Explicit payloads; `None` makes that mode fail
    #[must_use]
    pub fn with_outputs(mut self, file: &str, ast: Option<String>, abi: Option<String>) -> Self {
        self.outputs.insert(file.to_string(), Canned { ast, abi });
        self
    }

    /// Every invocation so far, in call order
    #[must_use]
    pub fn calls(&self) -> Vec<(OutputMode, PathBuf)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl Compiler for FakeCompiler {
    async fn invoke(&self, mode: OutputMode, source: &Path) -> Result<String, CompilationFailed> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((mode, source.to_path_buf()));
        }
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let canned = self.outputs.get(&name).ok_or(CompilationFailed::EmptyPayload)?;
        let payload = match mode {
            OutputMode::StructuralTree => &canned.ast,
            OutputMode::Interface => &canned.abi,
        };
        payload.clone().ok_or(CompilationFailed::EmptyPayload)
    }
}

/// Write `files` (name, contents) into `dir` and return their paths
///
/// # Errors
/// Returns the first I/O error creating a directory or writing a file.
pub fn write_corpus(dir: &Path, files: &[(&str, &str)]) -> std::io::Result<Vec<PathBuf>> {
    files
        .iter()
        .map(|(name, contents)| {
            let path = dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, contents)?;
            Ok(path)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corpus_files_land_in_nested_directories() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_corpus(dir.path(), &[("a/Token.sol", TOKEN_SOL), ("Crowdsale.sol", CROWDSALE_SOL)]).unwrap();
        assert_eq!(paths, vec![dir.path().join("a/Token.sol"), dir.path().join("Crowdsale.sol")]);
        assert_eq!(std::fs::read_to_string(&paths[0]).unwrap(), TOKEN_SOL);
    }

    #[test]
    fn unwritable_corpus_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        assert!(write_corpus(&blocker, &[("Token.sol", TOKEN_SOL)]).is_err());
    }
}
