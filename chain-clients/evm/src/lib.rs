//! EVM chain client library
//!
//! JSON-RPC access, ABI helpers for token calls, and legacy transaction
//! signing for the account-based and token-contract settlement chains.

pub mod abi;
pub mod client;
pub mod signer;

// Re-export for convenience
pub use abi::{
    approve_calldata, decode_call, encode_call, function_selector, DecodedCall, FunctionSignature,
    Token, IERC20,
};
pub use client::{EvmClient, EvmReceipt, EvmTransaction, InclusionState};
pub use signer::{parse_address, EvmSigner, LegacyTransaction};
