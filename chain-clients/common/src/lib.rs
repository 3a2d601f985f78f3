//! Shared helpers for the chain clients
//!
//! Address normalization, compound token addresses, and hex quantity parsing
//! used by the external chain clients, the settlement executors, and the
//! proof verifiers.

use std::num::ParseIntError;

/// Separator between the contract part and the wallet part of a token address.
pub const COMPOUND_SEPARATOR: char = '@';

/// Removes a leading `0x`/`0X` prefix if present.
pub fn strip_hex_prefix(value: &str) -> &str {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value)
}

/// Normalizes a hex address for comparison (no prefix, lowercase).
pub fn normalize_hex_address(address: &str) -> String {
    strip_hex_prefix(address.trim()).to_lowercase()
}

/// Compares two hex addresses ignoring prefix and case.
pub fn hex_addresses_equal(a: &str, b: &str) -> bool {
    normalize_hex_address(a) == normalize_hex_address(b)
}

/// An address value as stored on the ledger.
///
/// Token chains store `contractAddress@walletAddress`; every other chain
/// stores a plain wallet address and `contract` is `None`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompoundAddress {
    /// Token (or other) contract part, if the value was compound
    pub contract: Option<String>,
    /// Wallet part
    pub wallet: String,
}

impl CompoundAddress {
    /// Splits an address value on the first `@`.
    pub fn parse(value: &str) -> Self {
        match value.split_once(COMPOUND_SEPARATOR) {
            Some((contract, wallet)) => Self {
                contract: Some(contract.to_string()),
                wallet: wallet.to_string(),
            },
            None => Self {
                contract: None,
                wallet: value.to_string(),
            },
        }
    }

    /// Returns true when both values carry the same contract part.
    ///
    /// Two plain addresses trivially share the (absent) prefix.
    pub fn same_contract(&self, other: &CompoundAddress) -> bool {
        match (&self.contract, &other.contract) {
            (Some(a), Some(b)) => hex_addresses_equal(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for CompoundAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.contract {
            Some(contract) => write!(f, "{}{}{}", contract, COMPOUND_SEPARATOR, self.wallet),
            None => write!(f, "{}", self.wallet),
        }
    }
}

/// Parses a JSON-RPC hex quantity (`0x1a`) into a u64.
pub fn parse_hex_u64(value: &str) -> Result<u64, ParseIntError> {
    let digits = strip_hex_prefix(value);
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16)
}

/// Parses a hex quantity or a 32-byte ABI word into a u128.
pub fn parse_hex_u128(value: &str) -> Result<u128, ParseIntError> {
    let digits = strip_hex_prefix(value).trim_start_matches('0');
    if digits.is_empty() {
        return Ok(0);
    }
    u128::from_str_radix(digits, 16)
}

/// Formats a u64 as a JSON-RPC hex quantity.
pub fn to_hex_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}
