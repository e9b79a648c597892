//! Transaction Summaries
//!
//! Human-readable (and JSON) summary of a pending transaction sent to a
//! monitored contract. Emitted once per match, before decoding is attempted.

use std::fmt;

use alloy::primitives::U256;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::transaction::TransactionRecord;

/// Summary of a matched transaction
///
/// Every quantity is pre-rendered as a decimal string; optional values are
/// `None` while the transaction is pending.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSummary {
    /// Name of the monitored contract
    pub contract: String,
    /// When the pipeline fetched the record
    pub observed_at: DateTime<Utc>,
    /// Transaction hash with 0x prefix
    pub hash: String,
    /// Sender address (checksummed)
    pub from: String,
    /// Recipient address (checksummed)
    pub to: Option<String>,
    /// Allow-listed method name, e.g. "swapExactTokensForTokens"
    pub method: Option<String>,
    /// Value in wei as decimal string
    pub value: String,
    pub gas: String,
    pub gas_price: Option<String>,
    pub nonce: String,
    pub block_hash: Option<String>,
    pub block_number: Option<String>,
    pub transaction_index: Option<String>,
    /// Call data with 0x prefix
    pub input: String,
    pub v: Option<String>,
    pub r: Option<String>,
    pub s: Option<String>,
}

impl TransactionSummary {
    /// Summarize a record observed now
    pub fn from_record(contract: &str, record: &TransactionRecord) -> Self {
        Self::observed_at(contract, record, Utc::now())
    }

    /// Summarize a record observed at a given instant
    pub fn observed_at(contract: &str, record: &TransactionRecord, observed_at: DateTime<Utc>) -> Self {
        Self {
            contract: contract.to_string(),
            observed_at,
            hash: format!("{:#x}", record.hash),
            from: record.from.to_checksum(None),
            to: record.to.map(|a| a.to_checksum(None)),
            method: record.watched_method().map(|m| m.name().to_string()),
            value: record.value.to_string(),
            gas: record.gas.to_string(),
            gas_price: record.gas_price.as_ref().map(U256::to_string),
            nonce: record.nonce.to_string(),
            block_hash: record.block_hash.map(|h| format!("{:#x}", h)),
            block_number: record.block_number.map(|n| n.to_string()),
            transaction_index: record.transaction_index.map(|i| i.to_string()),
            input: format!("0x{}", hex::encode(&record.input)),
            v: record.v.as_ref().map(U256::to_string),
            r: record.r.as_ref().map(U256::to_string),
            s: record.s.as_ref().map(U256::to_string),
        }
    }

    /// Serialize the summary to a single JSON line
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl fmt::Display for TransactionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Transaction to contract ({}) at {}:",
            self.contract,
            self.observed_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?;
        writeln!(f, "Hash: {}", self.hash)?;
        writeln!(f, "From: {}", self.from)?;
        writeln!(f, "To: {}", or_dash(&self.to))?;
        writeln!(f, "Value: {}", self.value)?;
        writeln!(f, "Gas: {}", self.gas)?;
        writeln!(f, "Gas Price: {}", or_dash(&self.gas_price))?;
        writeln!(f, "Nonce: {}", self.nonce)?;
        writeln!(f, "Block Hash: {}", or_pending(&self.block_hash))?;
        writeln!(f, "Block Number: {}", or_pending(&self.block_number))?;
        writeln!(f, "Transaction Index: {}", or_pending(&self.transaction_index))?;
        writeln!(f, "Input Data: {}", self.input)?;
        writeln!(
            f,
            "V: {}, R: {}, S: {}",
            or_dash(&self.v),
            or_dash(&self.r),
            or_dash(&self.s)
        )
    }
}

fn or_dash(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("-")
}

fn or_pending(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("pending")
}
