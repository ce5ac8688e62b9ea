//! Interface (ABI) analysis
//!
//! Reads the compiler's combined-JSON ABI listing. Older compilers encode each
//! contract's ABI as a JSON string, newer ones inline the array; both are
//! accepted. Entries keep known fields and ignore the rest.

use serde::Deserialize;
use std::collections::BTreeMap;

/// One ABI parameter
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AbiParam {
    /// Parameter name (may be empty)
    #[serde(default)]
    pub name: String,
    /// Solidity type
    #[serde(rename = "type", default)]
    pub ty: String,
}

/// One ABI entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbiEntry {
    /// Entry kind (`function`, `constructor`, `event`, `fallback`, ...)
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    /// Entry name
    #[serde(default)]
    pub name: Option<String>,
    /// Input parameters
    #[serde(default)]
    pub inputs: Vec<AbiParam>,
    /// Output parameters
    #[serde(default)]
    pub outputs: Vec<AbiParam>,
    /// State mutability
    #[serde(default)]
    pub state_mutability: Option<String>,
}

fn default_kind() -> String {
    "function".to_string()
}

/// Shape of a contract's constructor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstructorShape {
    /// No constructor entry; an implicit no-argument constructor applies
    Absent,
    /// Constructor with zero inputs
    NoArgs,
    /// Constructor with this many inputs
    WithArgs(usize),
}

impl ConstructorShape {
    /// Classify a contract's ABI
    #[must_use]
    pub fn of(entries: &[AbiEntry]) -> Self {
        match entries.iter().find(|e| e.kind == "constructor") {
            None => Self::Absent,
            Some(ctor) if ctor.inputs.is_empty() => Self::NoArgs,
            Some(ctor) => Self::WithArgs(ctor.inputs.len()),
        }
    }

    /// Whether the contract can be deployed without arguments
    #[inline]
    #[must_use]
    pub fn is_deployable(self) -> bool {
        !matches!(self, Self::WithArgs(_))
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AbiField {
    Inline(Vec<AbiEntry>),
    Encoded(String),
}

#[derive(Debug, Deserialize)]
struct ContractInterface {
    abi: AbiField,
}

#[derive(Debug, Deserialize)]
struct CombinedOutput {
    #[serde(default)]
    contracts: BTreeMap<String, ContractInterface>,
}

/// ABI entries per contract, keyed as the compiler reports them (`path:Name`)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterfaceListing {
    contracts: BTreeMap<String, Vec<AbiEntry>>,
}

impl InterfaceListing {
    /// Parse a combined-JSON payload
    ///
    /// # Errors
    /// Returns the JSON error if the payload or an encoded ABI is malformed.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        let combined: CombinedOutput = serde_json::from_str(payload)?;
        let mut contracts = BTreeMap::new();
        for (key, interface) in combined.contracts {
            let entries = match interface.abi {
                AbiField::Inline(entries) => entries,
                AbiField::Encoded(text) => serde_json::from_str(&text)?,
            };
            contracts.insert(key, entries);
        }
        Ok(Self { contracts })
    }

    /// ABI of the contract named `name`, matched on the part after the last `:`
    #[must_use]
    pub fn for_contract(&self, name: &str) -> Option<&[AbiEntry]> {
        self.contracts
            .iter()
            .find(|(key, _)| key.rsplit(':').next() == Some(name))
            .map(|(_, entries)| entries.as_slice())
    }

    /// Number of contracts in the listing
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    /// Whether the listing is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_inline_and_encoded_abis() {
        let encoded = json!([{"type": "constructor", "inputs": [{"name": "cap", "type": "uint256"}]}]).to_string();
        let payload = json!({
            "contracts": {
                "/tmp/a.sol:Token": {"abi": [{"type": "function", "name": "totalSupply", "inputs": [], "outputs": [{"name": "", "type": "uint256"}], "constant": true}]},
                "/tmp/a.sol:Sale": {"abi": encoded}
            },
            "version": "0.4.26+commit.4563c3fc"
        })
        .to_string();

        let listing = InterfaceListing::parse(&payload).unwrap();
        assert_eq!(listing.len(), 2);
        assert_eq!(
            ConstructorShape::of(listing.for_contract("Token").unwrap()),
            ConstructorShape::Absent
        );
        assert_eq!(
            ConstructorShape::of(listing.for_contract("Sale").unwrap()),
            ConstructorShape::WithArgs(1)
        );
    }

    #[test]
    fn contract_lookup_matches_whole_name() {
        let payload = json!({"contracts": {"a.sol:MyToken": {"abi": []}}}).to_string();
        let listing = InterfaceListing::parse(&payload).unwrap();
        assert!(listing.for_contract("Token").is_none());
        assert!(listing.for_contract("MyToken").is_some());
    }

    #[test]
    fn missing_type_defaults_to_function() {
        let entry: AbiEntry = serde_json::from_value(json!({"name": "f", "inputs": []})).unwrap();
        assert_eq!(entry.kind, "function");
    }

    #[test]
    fn zero_input_constructor_is_deployable() {
        let entries: Vec<AbiEntry> =
            serde_json::from_value(json!([{"type": "constructor", "inputs": [], "payable": false}])).unwrap();
        let shape = ConstructorShape::of(&entries);
        assert_eq!(shape, ConstructorShape::NoArgs);
        assert!(shape.is_deployable());
        assert!(!ConstructorShape::WithArgs(3).is_deployable());
    }

    #[test]
    fn malformed_payload_is_an_error() {
        assert!(InterfaceListing::parse("{\"contracts\": 5}").is_err());
    }
}
