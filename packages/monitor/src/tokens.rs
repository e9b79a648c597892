//! Token Metadata
//!
//! Resolves ERC20 `name`, `symbol` and `decimals` for an address through
//! `eth_call` and memoizes successful results for the lifetime of the process.
//!
//! Concurrent lookups of the same address share a single in-flight resolution.
//! Failures are never cached, the next lookup tries the node again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use alloy::dyn_abi::{DynSolType, DynSolValue};
use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

use crate::chain::{ChainClient, ChainError};

sol! {
    interface IERC20Metadata {
        function name() external view returns (string);
        function symbol() external view returns (string);
        function decimals() external view returns (uint8);
    }
}

/// Errors that can occur while resolving token metadata
#[derive(Error, Debug)]
pub enum TokenError {
    #[error("Failed to fetch token {field} for {address}: {source}")]
    Call {
        address: Address,
        field: &'static str,
        #[source]
        source: ChainError,
    },

    #[error("Empty token {field} returned for {address}")]
    Empty { address: Address, field: &'static str },

    #[error("Invalid decimals response '{raw}' for {address}")]
    InvalidDecimals { address: Address, raw: String },

    #[error("Decimals value {value} for {address} does not fit in a byte")]
    DecimalsOutOfRange { address: Address, value: U256 },
}

/// Resolved ERC20 metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenInfo {
    pub address: Address,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
}

/// Anything that can turn an address into token metadata
#[async_trait]
pub trait TokenLookup: Send + Sync {
    async fn lookup(&self, address: Address) -> Result<TokenInfo, TokenError>;
}

/// Memoizing token metadata resolver
pub struct TokenResolver<C> {
    client: Arc<C>,
    cache: Mutex<HashMap<Address, Arc<OnceCell<TokenInfo>>>>,
}

impl<C: ChainClient> TokenResolver<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self {
            client,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve metadata for a token address
    ///
    /// Cache hits return without touching the node.
    pub async fn resolve(&self, address: Address) -> Result<TokenInfo, TokenError> {
        let slot = self.slot(address);
        match slot.get_or_try_init(|| self.fetch(address)).await {
            Ok(info) => Ok(info.clone()),
            Err(e) => {
                warn!(token = %address, error = %e, "Token metadata resolution failed");
                Err(e)
            }
        }
    }

    /// Cached metadata for an address, without any network access
    pub fn cached(&self, address: Address) -> Option<TokenInfo> {
        self.lock_cache()
            .get(&address)
            .and_then(|slot| slot.get().cloned())
    }

    /// Number of successfully resolved tokens
    pub fn cached_count(&self) -> usize {
        self.lock_cache()
            .values()
            .filter(|slot| slot.initialized())
            .count()
    }

    fn slot(&self, address: Address) -> Arc<OnceCell<TokenInfo>> {
        Arc::clone(self.lock_cache().entry(address).or_default())
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<Address, Arc<OnceCell<TokenInfo>>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn fetch(&self, address: Address) -> Result<TokenInfo, TokenError> {
        let name = self
            .call_text(address, "name", IERC20Metadata::nameCall {}.abi_encode())
            .await?;
        let symbol = self
            .call_text(address, "symbol", IERC20Metadata::symbolCall {}.abi_encode())
            .await?;
        let raw_decimals = self
            .call_raw(address, "decimals", IERC20Metadata::decimalsCall {}.abi_encode())
            .await?;
        let decimals = parse_decimals(address, &raw_decimals)?;

        debug!(token = %address, %symbol, %name, decimals, "Resolved token metadata");

        Ok(TokenInfo {
            address,
            symbol,
            name,
            decimals,
        })
    }

    async fn call_raw(
        &self,
        address: Address,
        field: &'static str,
        calldata: Vec<u8>,
    ) -> Result<String, TokenError> {
        let raw = self
            .client
            .call(address, Bytes::from(calldata))
            .await
            .map_err(|source| TokenError::Call {
                address,
                field,
                source,
            })?;

        if raw.is_empty() || raw == "0x" {
            return Err(TokenError::Empty { address, field });
        }
        Ok(raw)
    }

    async fn call_text(
        &self,
        address: Address,
        field: &'static str,
        calldata: Vec<u8>,
    ) -> Result<String, TokenError> {
        let raw = self.call_raw(address, field, calldata).await?;
        let text = decode_hex_string_if_needed(&raw);
        if text.trim().is_empty() {
            return Err(TokenError::Empty { address, field });
        }
        Ok(text)
    }
}

#[async_trait]
impl<C: ChainClient> TokenLookup for TokenResolver<C> {
    async fn lookup(&self, address: Address) -> Result<TokenInfo, TokenError> {
        self.resolve(address).await
    }
}

/// Decode a `0x`-prefixed hex response into text
///
/// ABI-encoded strings are unwrapped; other byte strings (such as `bytes32`
/// symbols) are read as raw text with trailing NULs removed. A value without
/// the prefix, or with invalid hex, is returned unchanged.
pub fn decode_hex_string_if_needed(raw: &str) -> String {
    let Some(digits) = raw.strip_prefix("0x") else {
        return raw.to_string();
    };
    let Ok(bytes) = hex::decode(digits) else {
        return raw.to_string();
    };

    if let Ok(DynSolValue::String(text)) = DynSolType::String.abi_decode(&bytes) {
        return text;
    }

    let end = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Parse a hexadecimal decimals response, refusing values above 255
pub fn parse_decimals(address: Address, raw: &str) -> Result<u8, TokenError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Err(TokenError::Empty {
            address,
            field: "decimals",
        });
    }

    let value = U256::from_str_radix(digits, 16).map_err(|_| TokenError::InvalidDecimals {
        address,
        raw: raw.to_string(),
    })?;

    u8::try_from(value).map_err(|_| TokenError::DecimalsOutOfRange { address, value })
}
