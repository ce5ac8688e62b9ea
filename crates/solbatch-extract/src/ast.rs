//! Structural-tree (AST) analysis
//!
//! Contract definitions may sit under arbitrary container nodes, so the tree
//! is searched depth-first. Both AST shapes emitted by the supported
//! compilers are recognized:
//! - legacy: `{"name": "ContractDefinition", "attributes": {...}, "children": [...]}`
//! - compact: `{"nodeType": "ContractDefinition", "name": ..., "nodes": [...]}`
//!
//! Records parse the fields they know and ignore everything else.

use serde::Deserialize;
use serde_json::Value;

const CONTRACT_DEFINITION: &str = "ContractDefinition";

/// Attributes of one contract definition
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractDefinition {
    /// Contract name
    pub name: String,
    /// `contract`, `library`, or `interface`
    #[serde(default)]
    pub contract_kind: Option<String>,
    /// Whether every function has a body
    #[serde(default)]
    pub fully_implemented: Option<bool>,
    /// Node ids of the linearized inheritance chain
    #[serde(default)]
    pub linearized_base_contracts: Vec<i64>,
}

/// All contract definitions in document order
#[must_use]
pub fn find_contracts(ast: &Value) -> Vec<ContractDefinition> {
    let mut found = Vec::new();
    collect_contracts(ast, &mut found);
    found
}

/// The canonical deployable contract: the last definition in document order
#[must_use]
pub fn select_canonical(ast: &Value) -> Option<ContractDefinition> {
    find_contracts(ast).pop()
}

fn collect_contracts(node: &Value, found: &mut Vec<ContractDefinition>) {
    match node {
        Value::Object(map) => {
            if let Some(definition) = as_contract_definition(node) {
                found.push(definition);
                return;
            }
            for child in map.values() {
                collect_contracts(child, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_contracts(item, found);
            }
        }
        _ => {}
    }
}

fn as_contract_definition(node: &Value) -> Option<ContractDefinition> {
    // A compact node for a contract literally named `ContractDefinition`
    // also matches on `name`, but carries no `attributes`.
    let legacy = node.get("name").and_then(Value::as_str) == Some(CONTRACT_DEFINITION);
    if let (true, Some(attributes)) = (legacy, node.get("attributes")) {
        return ContractDefinition::deserialize(attributes).ok();
    }

    let compact = node.get("nodeType").and_then(Value::as_str) == Some(CONTRACT_DEFINITION);
    if compact {
        return ContractDefinition::deserialize(node).ok();
    }
    None
}
