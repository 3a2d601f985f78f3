//! Native-value EVM verifier
//!
//! The payment is a plain value transfer: `to` is the payee, `value` the
//! amount and the calldata is exactly the payment proof.

use anyhow::{Context, Result};
use chain_clients_common::{hex_addresses_equal, strip_hex_prefix, CompoundAddress};
use chain_clients_evm::{EvmClient, EvmTransaction, InclusionState};

use super::{
    parse_network_chain_id, validate_depth, validate_proof_format, VerificationRequest,
    VerificationResult,
};
use crate::config::EthereumChainConfig;

/// Outcome of fetching the transaction named by a request
pub(crate) enum Lookup {
    /// Mined, successful, deep enough and sent by the expected payer
    Confirmed(EvmTransaction),
    Rejected(VerificationResult),
}

/// Checks shared by every EVM-based verifier: network, inclusion, depth and sender.
///
/// # Arguments
///
/// * `client` - Node client
/// * `request` - The payment claim
/// * `confirmations` - Required depth
/// * `sender` - Wallet the transaction must come from
pub(crate) async fn lookup_confirmed(
    client: &EvmClient,
    request: &VerificationRequest,
    confirmations: u64,
    sender: &str,
) -> Result<Lookup> {
    let expected_chain_id = match parse_network_chain_id(&request.network_id) {
        Some(id) => id,
        None => {
            return Ok(Lookup::Rejected(VerificationResult::rejected(format!(
                "Network id '{}' is not a chain id",
                request.network_id
            ))))
        }
    };
    let chain_id = client.get_chain_id().await.context("Failed to query chain id")?;
    if chain_id != expected_chain_id {
        return Ok(Lookup::Rejected(VerificationResult::rejected(format!(
            "Node is on chain {}, payment claims chain {}",
            chain_id, expected_chain_id
        ))));
    }

    let tx = match client.get_transaction(&request.txid).await? {
        Some(tx) => tx,
        None => {
            return Ok(Lookup::Rejected(VerificationResult::rejected(format!(
                "Transaction {} not found",
                request.txid
            ))))
        }
    };

    match client.inclusion_state(&request.txid).await? {
        InclusionState::Pending => {
            return Ok(Lookup::Rejected(VerificationResult::rejected(format!(
                "Transaction {} is not mined yet",
                request.txid
            ))))
        }
        InclusionState::Reverted { .. } => {
            return Ok(Lookup::Rejected(VerificationResult::rejected(format!(
                "Transaction {} reverted",
                request.txid
            ))))
        }
        InclusionState::Included { depth } => {
            if let Some(result) = validate_depth(&request.txid, depth, confirmations) {
                return Ok(Lookup::Rejected(result));
            }
        }
    }

    if !hex_addresses_equal(&tx.from, sender) {
        return Ok(Lookup::Rejected(VerificationResult::rejected(format!(
            "Transaction sender {} does not match payer {}",
            tx.from, sender
        ))));
    }

    Ok(Lookup::Confirmed(tx))
}

/// Decodes the 0x-prefixed calldata of a transaction.
pub(crate) fn calldata(tx: &EvmTransaction) -> Result<Vec<u8>> {
    hex::decode(strip_hex_prefix(&tx.input))
        .with_context(|| format!("Transaction {} has malformed calldata", tx.hash))
}

/// Rejects a transaction whose target is not `expected`.
pub(crate) fn validate_target(
    tx: &EvmTransaction,
    expected: &str,
    role: &str,
) -> Option<VerificationResult> {
    match tx.to.as_deref() {
        Some(to) if hex_addresses_equal(to, expected) => None,
        Some(to) => Some(VerificationResult::rejected(format!(
            "Transaction target {} does not match {} {}",
            to, role, expected
        ))),
        None => Some(VerificationResult::rejected(format!(
            "Transaction {} is a contract creation",
            tx.hash
        ))),
    }
}

pub struct EthereumVerifier {
    config: EthereumChainConfig,
    client: EvmClient,
}

impl EthereumVerifier {
    pub fn new(config: EthereumChainConfig) -> Result<Self> {
        let client = EvmClient::new(&config.rpc_url)?;
        Ok(Self { config, client })
    }

    pub async fn check(&self, request: &VerificationRequest) -> Result<VerificationResult> {
        if let Some(result) = validate_proof_format(request) {
            return Ok(result);
        }
        let src = CompoundAddress::parse(&request.src);
        let dst = CompoundAddress::parse(&request.dst);
        if src.contract.is_some() || dst.contract.is_some() {
            return Ok(VerificationResult::rejected(
                "Native-value payments use plain addresses",
            ));
        }

        let confirmations = self.config.confirmations;
        let tx = match lookup_confirmed(&self.client, request, confirmations, &src.wallet).await? {
            Lookup::Confirmed(tx) => tx,
            Lookup::Rejected(result) => return Ok(result),
        };

        if let Some(result) = validate_target(&tx, &dst.wallet, "payee") {
            return Ok(result);
        }

        let value = tx.value_wei()?;
        if value != request.amount as u128 {
            return Ok(VerificationResult::rejected(format!(
                "Transaction value {} does not match amount {}",
                value, request.amount
            )));
        }

        let data = calldata(&tx)?;
        if request.proof_bytes().map(|p| p.to_vec()) != Some(data) {
            return Ok(VerificationResult::rejected(format!(
                "Transaction {} does not carry the payment proof",
                tx.hash
            )));
        }

        Ok(VerificationResult::accepted(format!(
            "Transaction {} pays {} to {}",
            tx.hash, request.amount, dst.wallet
        )))
    }
}
