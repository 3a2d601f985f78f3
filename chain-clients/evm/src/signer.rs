//! Legacy (EIP-155) transaction signing
//!
//! Wraps an alloy local signer. Transactions are built as `TxLegacy`, signed
//! with the chain id bound into the signature, and returned as the raw
//! envelope bytes expected by `eth_sendRawTransaction`.

use alloy_consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy_eips::eip2718::Encodable2718;
use alloy_network::TxSigner;
use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result};
use chain_clients_common::strip_hex_prefix;

/// Unsigned legacy transaction fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyTransaction {
    pub nonce: u64,
    pub gas_price: u128,
    pub gas_limit: u64,
    /// Recipient (20 bytes)
    pub to: [u8; 20],
    pub value: u128,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

/// Holds an EVM private key and signs transactions with it
pub struct EvmSigner {
    signer: PrivateKeySigner,
}

impl EvmSigner {
    /// Creates a signer from a hex-encoded 32-byte private key.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let bytes = hex::decode(strip_hex_prefix(secret.trim()))
            .context("EVM private key is not valid hex")?;
        if bytes.len() != 32 {
            anyhow::bail!(
                "Invalid EVM private key length: expected 32 bytes, got {}",
                bytes.len()
            );
        }
        let signer = PrivateKeySigner::from_slice(&bytes)
            .map_err(|e| anyhow::anyhow!("Invalid EVM private key: {}", e))?;
        Ok(Self { signer })
    }

    /// Returns the account address (lowercase, 0x-prefixed).
    pub fn address(&self) -> String {
        format!("0x{}", hex::encode(self.signer.address().as_slice()))
    }

    /// Signs a legacy transaction and returns its raw encoding.
    pub async fn sign(&self, tx: &LegacyTransaction) -> Result<Vec<u8>> {
        let mut legacy_tx = TxLegacy {
            chain_id: Some(tx.chain_id),
            nonce: tx.nonce,
            gas_price: tx.gas_price,
            gas_limit: tx.gas_limit,
            to: TxKind::Call(Address::from(tx.to)),
            value: U256::from(tx.value),
            input: Bytes::from(tx.data.clone()),
        };

        let signature = self
            .signer
            .sign_transaction(&mut legacy_tx)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to sign transaction: {}", e))?;

        let envelope = TxEnvelope::from(legacy_tx.into_signed(signature));
        Ok(envelope.encoded_2718())
    }
}

/// Parses a 0x-prefixed 20-byte address into raw bytes.
pub fn parse_address(address: &str) -> Result<[u8; 20]> {
    let parsed = address
        .trim()
        .parse::<Address>()
        .with_context(|| format!("Invalid EVM address '{}'", address))?;
    Ok(parsed.into_array())
}
