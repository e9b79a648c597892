//! Call Data Decoder
//!
//! Resolves the invoked function of a monitored contract by its 4-byte selector,
//! unpacks the arguments against the contract's JSON ABI and renders them as
//! display fragments. Address collections are annotated with token metadata
//! when enrichment is enabled.

use alloy::dyn_abi::{DynSolValue, JsonAbiExt};
use alloy::primitives::{Address, TxHash};
use thiserror::Error;

use crate::filter::extract_selector;
use crate::registry::ContractDescriptor;
use crate::tokens::TokenLookup;

/// Errors that can occur during call data decoding
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Input too short for selector extraction ({0} bytes)")]
    InputTooShort(usize),

    #[error("Method not found for selector 0x{}", hex::encode(.0))]
    MethodNotFound([u8; 4]),

    #[error("Failed to unpack arguments of {method}: {reason}")]
    Unpack { method: String, reason: String },
}

/// A single decoded argument
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedParam {
    /// Parameter name as declared in the ABI (may be empty)
    pub name: String,
    /// Canonical Solidity type, e.g. `address[]`
    pub ty: String,
    pub value: DynSolValue,
}

/// Decoded function call against a monitored contract
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMethodCall {
    /// Function name, e.g. `swapExactTokensForTokens`
    pub name: String,
    pub selector: [u8; 4],
    /// Arguments in declaration order
    pub params: Vec<DecodedParam>,
}

impl DecodedMethodCall {
    /// Look up an argument by name
    pub fn param(&self, name: &str) -> Option<&DecodedParam> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn selector_hex(&self) -> String {
        format!("0x{}", hex::encode(self.selector))
    }
}

/// Whether address collections are annotated with token metadata
#[derive(Clone, Copy)]
pub enum Enrichment<'a> {
    Tokens(&'a dyn TokenLookup),
    Disabled,
}

impl Enrichment<'_> {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Enrichment::Tokens(_))
    }
}

/// Decode call data against a contract's interface
///
/// # Arguments
/// * `input` - Full call data, selector included
/// * `contract` - The monitored contract the transaction is sent to
///
/// # Returns
/// The function name with its arguments in declaration order
pub fn decode_call(input: &[u8], contract: &ContractDescriptor) -> Result<DecodedMethodCall, DecodeError> {
    let selector = extract_selector(input).ok_or(DecodeError::InputTooShort(input.len()))?;
    let function = contract
        .function(&selector)
        .ok_or(DecodeError::MethodNotFound(selector))?;

    let values = function
        .abi_decode_input(&input[4..], false)
        .map_err(|e| DecodeError::Unpack {
            method: function.name.clone(),
            reason: e.to_string(),
        })?;

    let params = function
        .inputs
        .iter()
        .zip(values)
        .map(|(param, value)| DecodedParam {
            name: param.name.clone(),
            ty: param.selector_type().into_owned(),
            value,
        })
        .collect();

    Ok(DecodedMethodCall {
        name: function.name.clone(),
        selector,
        params,
    })
}

/// Fragments that introduce a decoded call on the details feed
pub fn header_fragments(hash: TxHash, method: &str) -> [String; 2] {
    [
        format!("TxHash: {:#x}\n", hash),
        format!("Method Name: {}\n", method),
    ]
}

/// Render one argument as a display fragment
///
/// Address collections produce a header line followed by one line per
/// address; everything else fits on a single line.
pub async fn render_param(param: &DecodedParam, enrichment: Enrichment<'_>) -> String {
    match address_collection(&param.value) {
        Some(addresses) => {
            let mut fragment = format!("  {} ({}):\n", param.name, param.ty);
            for address in addresses {
                fragment.push_str(&render_address_line(address, enrichment).await);
            }
            fragment
        }
        None => format!("  {} ({}): {}\n", param.name, param.ty, format_value(&param.value)),
    }
}

/// Render every argument of a call, in order
pub async fn render_all(call: &DecodedMethodCall, enrichment: Enrichment<'_>) -> Vec<String> {
    let mut fragments = Vec::with_capacity(call.params.len());
    for param in &call.params {
        fragments.push(render_param(param, enrichment).await);
    }
    fragments
}

async fn render_address_line(address: Address, enrichment: Enrichment<'_>) -> String {
    let checksummed = address.to_checksum(None);
    match enrichment {
        Enrichment::Disabled => format!("    - {}\n", checksummed),
        Enrichment::Tokens(tokens) => match tokens.lookup(address).await {
            Ok(token) => format!("    - {} ({}: {})\n", checksummed, token.symbol, token.name),
            Err(_) => format!("    - {} (Token details fetch failed)\n", checksummed),
        },
    }
}

/// Addresses of an `address[]` / `address[N]` value
fn address_collection(value: &DynSolValue) -> Option<Vec<Address>> {
    match value {
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => items
            .iter()
            .map(|item| match item {
                DynSolValue::Address(address) => Some(*address),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .filter(|addresses| !addresses.is_empty()),
        _ => None,
    }
}

/// Natural string form of a decoded value
///
/// Integers in base 10, addresses checksummed, byte strings as 0x-hex.
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Uint(v, _) => v.to_string(),
        DynSolValue::Int(v, _) => v.to_string(),
        DynSolValue::Address(address) => address.to_checksum(None),
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Bytes(bytes) => format!("0x{}", hex::encode(bytes)),
        DynSolValue::FixedBytes(word, size) => format!("0x{}", hex::encode(&word[..*size])),
        DynSolValue::Function(function) => function.to_string(),
        DynSolValue::Array(items) | DynSolValue::FixedArray(items) => {
            format!("[{}]", join_values(items))
        }
        DynSolValue::Tuple(items) => format!("({})", join_values(items)),
        #[allow(unreachable_patterns)]
        other => format!("{:?}", other),
    }
}

fn join_values(items: &[DynSolValue]) -> String {
    items.iter().map(format_value).collect::<Vec<_>>().join(", ")
}
