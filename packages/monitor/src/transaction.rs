//! Transaction Records
//!
//! Full transaction snapshots as returned by `eth_getTransactionByHash`.
//! Quantities arrive hex-encoded and are parsed into typed fields on deserialize.

use alloy::primitives::{Address, Bytes, TxHash, B256, U256, U64};
use serde::Deserialize;

use crate::filter::{extract_selector, filter_input, MethodSelector};

/// Immutable snapshot of a pending transaction
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    /// Transaction hash
    pub hash: TxHash,
    /// Sender address
    pub from: Address,
    /// Recipient address (None for contract creation)
    #[serde(default)]
    pub to: Option<Address>,
    /// Transaction value in wei
    pub value: U256,
    /// Gas limit
    pub gas: U64,
    /// Gas price, absent on some EIP-1559 responses
    #[serde(default)]
    pub gas_price: Option<U256>,
    pub nonce: U64,
    /// Transaction input data (calldata)
    pub input: Bytes,
    /// Block metadata, unset while the transaction is pending
    #[serde(default)]
    pub block_hash: Option<B256>,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub transaction_index: Option<U64>,
    /// Signature fields
    #[serde(default)]
    pub v: Option<U256>,
    #[serde(default)]
    pub r: Option<U256>,
    #[serde(default)]
    pub s: Option<U256>,
}

impl TransactionRecord {
    /// First 4 bytes of input, if present
    pub fn selector(&self) -> Option<[u8; 4]> {
        extract_selector(&self.input)
    }

    /// Allow-listed method this transaction calls, if any
    pub fn watched_method(&self) -> Option<MethodSelector> {
        filter_input(&self.input)
    }

    /// Get the selector as a hex string with 0x prefix
    pub fn selector_hex(&self) -> Option<String> {
        self.selector().map(|id| format!("0x{}", hex::encode(id)))
    }

    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const PENDING_JSON: &str = r#"{
        "blockHash": null,
        "blockNumber": null,
        "from": "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266",
        "gas": "0x30d40",
        "gasPrice": "0x4a817c800",
        "hash": "0x1234567890abcdef1234567890abcdef1234567890abcdef1234567890abcdef",
        "input": "0x38ed17390000000000000000000000000000000000000000000000000de0b6b3a7640000",
        "nonce": "0x2a",
        "to": "0x7a250d5630b4cf539739df2c5dacb4c659f2488d",
        "transactionIndex": null,
        "value": "0xde0b6b3a7640000",
        "type": "0x0",
        "v": "0x25",
        "r": "0x1",
        "s": "0x2"
    }"#;

    #[test]
    fn test_deserialize_pending_transaction() {
        let record: TransactionRecord = serde_json::from_str(PENDING_JSON).unwrap();

        assert_eq!(record.from, address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266"));
        assert_eq!(record.to, Some(address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D")));
        assert_eq!(record.gas, U64::from(200_000u64));
        assert_eq!(record.gas_price, Some(U256::from(20_000_000_000u64)));
        assert_eq!(record.nonce, U64::from(42u64));
        assert_eq!(record.value, U256::from(1_000_000_000_000_000_000u64));
        assert_eq!(record.v, Some(U256::from(0x25u64)));
        assert!(record.block_hash.is_none());
        assert!(record.block_number.is_none());
        assert!(record.transaction_index.is_none());
    }

    #[test]
    fn test_deserialize_contract_creation() {
        let json = PENDING_JSON.replace(
            r#""to": "0x7a250d5630b4cf539739df2c5dacb4c659f2488d""#,
            r#""to": null"#,
        );
        let record: TransactionRecord = serde_json::from_str(&json).unwrap();
        assert!(record.is_contract_creation());
    }

    #[test]
    fn test_deserialize_rejects_malformed_hash() {
        let json = PENDING_JSON.replace("0x1234567890abcdef", "0xnothex");
        assert!(serde_json::from_str::<TransactionRecord>(&json).is_err());
    }

    #[test]
    fn test_selector_helpers() {
        let record: TransactionRecord = serde_json::from_str(PENDING_JSON).unwrap();
        assert_eq!(record.selector(), Some([0x38, 0xed, 0x17, 0x39]));
        assert_eq!(record.selector_hex(), Some("0x38ed1739".to_string()));
        assert_eq!(record.watched_method(), Some(MethodSelector::SwapExactTokensForTokens));
    }

    #[test]
    fn test_selector_helpers_empty_input() {
        let record = fixtures::pending_record(None, vec![]);
        assert_eq!(record.selector(), None);
        assert_eq!(record.selector_hex(), None);
        assert_eq!(record.watched_method(), None);
    }
}
