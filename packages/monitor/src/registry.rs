//! Contract Registry
//!
//! The monitored contracts, loaded once at startup from a JSON file of
//! `{ "name", "address", "abi" }` records and read-only afterwards.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use alloy::json_abi::{Function, JsonAbi};
use alloy::primitives::Address;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

/// Errors raised while loading the contracts file
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to read contracts file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse contracts JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid address '{address}' for contract '{name}'")]
    InvalidAddress { name: String, address: String },
}

/// Raw entry of the contracts file
#[derive(Debug, Deserialize)]
struct ContractEntry {
    name: String,
    address: String,
    abi: JsonAbi,
}

/// A monitored contract with its interface definition
#[derive(Debug, Clone)]
pub struct ContractDescriptor {
    pub name: String,
    pub address: Address,
    pub abi: JsonAbi,
    /// Functions keyed by 4-byte selector
    functions: HashMap<[u8; 4], Function>,
}

impl ContractDescriptor {
    pub fn new(name: impl Into<String>, address: Address, abi: JsonAbi) -> Self {
        let functions = abi
            .functions()
            .map(|func| (func.selector().0, func.clone()))
            .collect();

        Self {
            name: name.into(),
            address,
            abi,
            functions,
        }
    }

    /// Look up a function by selector
    pub fn function(&self, selector: &[u8; 4]) -> Option<&Function> {
        self.functions.get(selector)
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }
}

/// Parse an address regardless of hex case or surrounding whitespace
pub fn normalize_address(raw: &str) -> Option<Address> {
    Address::from_str(&raw.trim().to_ascii_lowercase()).ok()
}

/// In-memory list of monitored contracts
#[derive(Debug, Clone, Default)]
pub struct ContractRegistry {
    contracts: Vec<ContractDescriptor>,
}

impl ContractRegistry {
    pub fn new(contracts: Vec<ContractDescriptor>) -> Self {
        Self { contracts }
    }

    /// Load the registry from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.display().to_string(),
            source,
        })?;

        let registry = Self::from_json_str(&json)?;
        info!(
            "Loaded {} monitored contracts from {}",
            registry.len(),
            path.display()
        );
        Ok(registry)
    }

    /// Parse a JSON array of `{ name, address, abi }` records
    pub fn from_json_str(json: &str) -> Result<Self, RegistryError> {
        let entries: Vec<ContractEntry> = serde_json::from_str(json)?;

        let contracts = entries
            .into_iter()
            .map(|entry| {
                let address = normalize_address(&entry.address).ok_or_else(|| {
                    RegistryError::InvalidAddress {
                        name: entry.name.clone(),
                        address: entry.address.clone(),
                    }
                })?;
                Ok(ContractDescriptor::new(entry.name, address, entry.abi))
            })
            .collect::<Result<Vec<_>, RegistryError>>()?;

        Ok(Self { contracts })
    }

    /// Find the monitored contract a transaction is sent to
    ///
    /// Linear scan, first match wins. Contract creations never match.
    pub fn match_recipient(&self, recipient: Option<Address>) -> Option<&ContractDescriptor> {
        let recipient = recipient?;
        self.contracts.iter().find(|c| c.address == recipient)
    }

    pub fn contracts(&self) -> &[ContractDescriptor] {
        &self.contracts
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::MethodSelector;
    use alloy::primitives::address;
    use std::io::Write;

    const CONTRACTS_JSON: &str = r#"[
        {
            "name": "Uniswap V2 Router",
            "address": "0x7a250d5630B4cF539739dF2C5dAcb4c659F2488D",
            "abi": [
                {"type":"function","name":"swapExactTokensForTokens","stateMutability":"nonpayable",
                 "inputs":[{"name":"amountIn","type":"uint256"},{"name":"amountOutMin","type":"uint256"},
                           {"name":"path","type":"address[]"},{"name":"to","type":"address"},
                           {"name":"deadline","type":"uint256"}],
                 "outputs":[{"name":"amounts","type":"uint256[]"}]}
            ]
        },
        {
            "name": "WETH",
            "address": "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2",
            "abi": [
                {"type":"function","name":"deposit","stateMutability":"payable","inputs":[],"outputs":[]},
                {"type":"function","name":"withdraw","stateMutability":"nonpayable",
                 "inputs":[{"name":"wad","type":"uint256"}],"outputs":[]}
            ]
        }
    ]"#;

    #[test]
    fn test_from_json_str_loads_all_contracts() {
        let registry = ContractRegistry::from_json_str(CONTRACTS_JSON).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.contracts()[0].name, "Uniswap V2 Router");
        assert_eq!(registry.contracts()[0].function_count(), 1);
        assert_eq!(registry.contracts()[1].function_count(), 2);
    }

    #[test]
    fn test_function_lookup_by_selector() {
        let registry = ContractRegistry::from_json_str(CONTRACTS_JSON).unwrap();
        let router = &registry.contracts()[0];
        let function = router.function(&[0x38, 0xed, 0x17, 0x39]).unwrap();
        assert_eq!(function.name, "swapExactTokensForTokens");
        assert!(router.function(&[0xd0, 0xe3, 0x0d, 0xb0]).is_none());
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let registry = ContractRegistry::from_json_str(CONTRACTS_JSON).unwrap();

        // Stored lowercase in the file, looked up by checksummed literal
        let weth = address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
        assert_eq!(registry.match_recipient(Some(weth)).unwrap().name, "WETH");

        let router = normalize_address("0x7A250D5630B4CF539739DF2C5DACB4C659F2488D").unwrap();
        assert_eq!(registry.match_recipient(Some(router)).unwrap().name, "Uniswap V2 Router");
    }

    #[test]
    fn test_match_unknown_recipient() {
        let registry = ContractRegistry::from_json_str(CONTRACTS_JSON).unwrap();
        assert!(registry.match_recipient(Some(Address::repeat_byte(0x42))).is_none());
    }

    #[test]
    fn test_contract_creation_never_matches() {
        let registry = ContractRegistry::from_json_str(CONTRACTS_JSON).unwrap();
        assert!(registry.match_recipient(None).is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let addr = Address::repeat_byte(0x01);
        let registry = ContractRegistry::new(vec![
            ContractDescriptor::new("first", addr, JsonAbi::default()),
            ContractDescriptor::new("second", addr, JsonAbi::default()),
        ]);
        assert_eq!(registry.match_recipient(Some(addr)).unwrap().name, "first");
    }

    #[test]
    fn test_invalid_address_is_rejected() {
        let json = r#"[{"name":"Broken","address":"0x1234","abi":[]}]"#;
        let err = ContractRegistry::from_json_str(json).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidAddress { ref name, .. } if name == "Broken"));
    }

    #[test]
    fn test_invalid_json_is_rejected() {
        assert!(matches!(
            ContractRegistry::from_json_str("{not json"),
            Err(RegistryError::Json(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(CONTRACTS_JSON.as_bytes()).unwrap();

        let registry = ContractRegistry::load(file.path()).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ContractRegistry::load("/nonexistent/contracts.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/contracts.json"));
    }

    #[test]
    fn test_normalize_address_variants() {
        let expected = address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D");
        assert_eq!(normalize_address(" 0x7a250d5630b4cf539739df2c5dacb4c659f2488d "), Some(expected));
        assert_eq!(normalize_address("7a250d5630b4cf539739df2c5dacb4c659f2488d"), Some(expected));
        assert_eq!(normalize_address("0xnothex"), None);
    }

    #[test]
    fn test_shipped_contracts_cover_allow_list() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/configs/contracts.json");
        let registry = ContractRegistry::load(path).unwrap();
        assert_eq!(registry.len(), 2);

        for method in MethodSelector::ALL {
            let covered = registry
                .contracts()
                .iter()
                .any(|c| c.function(&method.selector()).map(|f| f.name.as_str()) == Some(method.name()));
            assert!(covered, "{} is not declared by any shipped contract", method.name());
        }
    }
}
