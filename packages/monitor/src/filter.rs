//! Selector Filtering
//!
//! Cheap pre-filter over the first 4 bytes of transaction call data.
//! Targets Uniswap V2 style routers and wrapped-ether token contracts.

use std::collections::HashMap;
use std::sync::LazyLock;

/// Contract family a watched selector belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SelectorFamily {
    /// Uniswap V2 style router swaps and liquidity management
    Router,
    /// Wrapped-ether deposits, withdrawals and ERC20 transfers
    WrappedNative,
}

/// The method selectors the monitor forwards to the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodSelector {
    /// swapExactTokensForTokens - 0x38ed1739
    SwapExactTokensForTokens,
    /// swapTokensForExactTokens - 0x8803dbee
    SwapTokensForExactTokens,
    /// swapExactETHForTokens - 0x7ff36ab5
    SwapExactEthForTokens,
    /// swapTokensForExactETH - 0x4a25d94a
    SwapTokensForExactEth,
    /// swapExactTokensForETH - 0x18cbafe5
    SwapExactTokensForEth,
    /// swapETHForExactTokens - 0xfb3bdb41
    SwapEthForExactTokens,
    /// addLiquidity - 0xe8e33700
    AddLiquidity,
    /// addLiquidityETH - 0xf305d719
    AddLiquidityEth,
    /// removeLiquidity - 0xbaa2abde
    RemoveLiquidity,
    /// removeLiquidityETH - 0x02751cec
    RemoveLiquidityEth,
    /// deposit - 0xd0e30db0
    Deposit,
    /// withdraw - 0x2e1a7d4d
    Withdraw,
    /// approve - 0x095ea7b3
    Approve,
    /// transfer - 0xa9059cbb
    Transfer,
    /// transferFrom - 0x23b872dd
    TransferFrom,
}

impl MethodSelector {
    /// Every selector on the allow-list
    pub const ALL: [MethodSelector; 15] = [
        MethodSelector::SwapExactTokensForTokens,
        MethodSelector::SwapTokensForExactTokens,
        MethodSelector::SwapExactEthForTokens,
        MethodSelector::SwapTokensForExactEth,
        MethodSelector::SwapExactTokensForEth,
        MethodSelector::SwapEthForExactTokens,
        MethodSelector::AddLiquidity,
        MethodSelector::AddLiquidityEth,
        MethodSelector::RemoveLiquidity,
        MethodSelector::RemoveLiquidityEth,
        MethodSelector::Deposit,
        MethodSelector::Withdraw,
        MethodSelector::Approve,
        MethodSelector::Transfer,
        MethodSelector::TransferFrom,
    ];

    /// Returns the 4-byte method selector
    pub fn selector(&self) -> [u8; 4] {
        match self {
            MethodSelector::SwapExactTokensForTokens => [0x38, 0xed, 0x17, 0x39],
            MethodSelector::SwapTokensForExactTokens => [0x88, 0x03, 0xdb, 0xee],
            MethodSelector::SwapExactEthForTokens => [0x7f, 0xf3, 0x6a, 0xb5],
            MethodSelector::SwapTokensForExactEth => [0x4a, 0x25, 0xd9, 0x4a],
            MethodSelector::SwapExactTokensForEth => [0x18, 0xcb, 0xaf, 0xe5],
            MethodSelector::SwapEthForExactTokens => [0xfb, 0x3b, 0xdb, 0x41],
            MethodSelector::AddLiquidity => [0xe8, 0xe3, 0x37, 0x00],
            MethodSelector::AddLiquidityEth => [0xf3, 0x05, 0xd7, 0x19],
            MethodSelector::RemoveLiquidity => [0xba, 0xa2, 0xab, 0xde],
            MethodSelector::RemoveLiquidityEth => [0x02, 0x75, 0x1c, 0xec],
            MethodSelector::Deposit => [0xd0, 0xe3, 0x0d, 0xb0],
            MethodSelector::Withdraw => [0x2e, 0x1a, 0x7d, 0x4d],
            MethodSelector::Approve => [0x09, 0x5e, 0xa7, 0xb3],
            MethodSelector::Transfer => [0xa9, 0x05, 0x9c, 0xbb],
            MethodSelector::TransferFrom => [0x23, 0xb8, 0x72, 0xdd],
        }
    }

    /// Returns the human-readable method name
    pub fn name(&self) -> &'static str {
        match self {
            MethodSelector::SwapExactTokensForTokens => "swapExactTokensForTokens",
            MethodSelector::SwapTokensForExactTokens => "swapTokensForExactTokens",
            MethodSelector::SwapExactEthForTokens => "swapExactETHForTokens",
            MethodSelector::SwapTokensForExactEth => "swapTokensForExactETH",
            MethodSelector::SwapExactTokensForEth => "swapExactTokensForETH",
            MethodSelector::SwapEthForExactTokens => "swapETHForExactTokens",
            MethodSelector::AddLiquidity => "addLiquidity",
            MethodSelector::AddLiquidityEth => "addLiquidityETH",
            MethodSelector::RemoveLiquidity => "removeLiquidity",
            MethodSelector::RemoveLiquidityEth => "removeLiquidityETH",
            MethodSelector::Deposit => "deposit",
            MethodSelector::Withdraw => "withdraw",
            MethodSelector::Approve => "approve",
            MethodSelector::Transfer => "transfer",
            MethodSelector::TransferFrom => "transferFrom",
        }
    }

    /// Returns the hex-encoded selector with 0x prefix
    pub fn hex(&self) -> String {
        format!("0x{}", hex::encode(self.selector()))
    }

    pub fn family(&self) -> SelectorFamily {
        match self {
            MethodSelector::Deposit
            | MethodSelector::Withdraw
            | MethodSelector::Approve
            | MethodSelector::Transfer
            | MethodSelector::TransferFrom => SelectorFamily::WrappedNative,
            _ => SelectorFamily::Router,
        }
    }
}

/// Static lookup table for the allow-list, fixed at build time
static ALLOWED_SELECTORS: LazyLock<HashMap<[u8; 4], MethodSelector>> = LazyLock::new(|| {
    MethodSelector::ALL
        .iter()
        .map(|method| (method.selector(), *method))
        .collect()
});

/// Get the allow-listed method for a given selector, if it matches
pub fn get_method(selector: &[u8; 4]) -> Option<MethodSelector> {
    ALLOWED_SELECTORS.get(selector).copied()
}

/// Get the human-readable method name for a given selector
pub fn get_method_name(selector: &[u8; 4]) -> Option<&'static str> {
    get_method(selector).map(|m| m.name())
}

/// Extract the selector from call data
///
/// # Returns
/// `Some([u8; 4])` if input has at least 4 bytes, `None` otherwise
pub fn extract_selector(input: &[u8]) -> Option<[u8; 4]> {
    let head = input.get(..4)?;
    let mut selector = [0u8; 4];
    selector.copy_from_slice(head);
    Some(selector)
}

/// Filter call data - returns the matching method if it is on the allow-list
pub fn filter_input(input: &[u8]) -> Option<MethodSelector> {
    extract_selector(input).and_then(|id| get_method(&id))
}

/// Check whether raw call data starts with an allow-listed selector
///
/// Input shorter than 4 bytes is never relevant.
pub fn is_relevant(input: &[u8]) -> bool {
    filter_input(input).is_some()
}

/// Hex-string variant of [`is_relevant`]
///
/// The `0x` prefix is optional. Fewer than 8 hex characters after the prefix,
/// or a non-hex selector, is never relevant.
pub fn is_relevant_hex(input: &str) -> bool {
    let digits = input.strip_prefix("0x").unwrap_or(input);
    let Some(head) = digits.get(..8) else {
        return false;
    };

    let mut selector = [0u8; 4];
    match hex::decode_to_slice(head, &mut selector) {
        Ok(()) => get_method(&selector).is_some(),
        Err(_) => false,
    }
}
