//! Bitcoin chain client library
//!
//! JSON-RPC access to a Bitcoin Core node plus key and amount helpers for the
//! native-coin settlement chain.

pub mod client;
pub mod keys;

pub use client::{
    BlockchainInfo, BtcClient, BtcInput, BtcOutput, BtcTransaction, NodeError, ScriptPubKey,
    SignedTransaction, Utxo,
};
pub use keys::{
    coins_to_sats, double_sha256, op_return_payload, sats_to_coin_string, WifKey,
    DUST_LIMIT_SATS, SATS_PER_COIN,
};
