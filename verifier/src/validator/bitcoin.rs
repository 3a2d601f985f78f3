//! Native-coin (Bitcoin) verifier
//!
//! A payment is a transaction spending only the payer's outputs, with one
//! output paying exactly the amount to the payee and an `OP_RETURN` output
//! carrying the payment proof.

use anyhow::{Context, Result};
use chain_clients_btc::{op_return_payload, BtcClient, BtcTransaction};
use chain_clients_common::CompoundAddress;
use tracing::debug;

use super::{validate_depth, validate_proof_format, VerificationRequest, VerificationResult};
use crate::config::BitcoinChainConfig;

pub struct BitcoinVerifier {
    config: BitcoinChainConfig,
    client: BtcClient,
}

impl BitcoinVerifier {
    pub fn new(config: BitcoinChainConfig) -> Result<Self> {
        let credentials = match (&config.rpc_user, &config.rpc_password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };
        let client = BtcClient::new(&config.rpc_url, credentials)?;
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
                "Native-coin payments use plain addresses",
            ));
        }

        let info = self
            .client
            .get_blockchain_info()
            .await
            .context("Failed to query blockchain info")?;
        if info.chain != request.network_id {
            return Ok(VerificationResult::rejected(format!(
                "Node is on network '{}', payment claims '{}'",
                info.chain, request.network_id
            )));
        }

        let tx = match self.client.get_raw_transaction(&request.txid).await? {
            Some(tx) => tx,
            None => {
                return Ok(VerificationResult::rejected(format!(
                    "Transaction {} not found",
                    request.txid
                )))
            }
        };

        let depth = tx.confirmations.unwrap_or(0);
        if let Some(result) = validate_depth(&tx.txid, depth, self.config.confirmations) {
            return Ok(result);
        }

        if let Some(result) = self.validate_sender(&tx, &src.wallet).await? {
            return Ok(result);
        }
        if let Some(result) = validate_payee_output(&tx, &dst.wallet, request.amount)? {
            return Ok(result);
        }
        if let Some(result) = validate_proof_output(&tx, request) {
            return Ok(result);
        }

        Ok(VerificationResult::accepted(format!(
            "Transaction {} pays {} sats to {}",
            tx.txid, request.amount, dst.wallet
        )))
    }

    /// Every input must spend an output owned by the payer.
    async fn validate_sender(
        &self,
        tx: &BtcTransaction,
        payer: &str,
    ) -> Result<Option<VerificationResult>> {
        for input in &tx.vin {
            let (prev_txid, prev_vout) = match (&input.txid, input.vout) {
                (Some(txid), Some(vout)) => (txid, vout),
                _ => {
                    return Ok(Some(VerificationResult::rejected(format!(
                        "Transaction {} spends a coinbase input",
                        tx.txid
                    ))))
                }
            };

            let prev = match self.client.get_raw_transaction(prev_txid).await? {
                Some(prev) => prev,
                None => {
                    return Ok(Some(VerificationResult::rejected(format!(
                        "Input transaction {} not found",
                        prev_txid
                    ))))
                }
            };

            let owner = prev
                .vout
                .iter()
                .find(|output| output.n == prev_vout)
                .and_then(|output| output.script_pub_key.address.as_deref());
            debug!("Input {}:{} owned by {:?}", prev_txid, prev_vout, owner);
            if owner != Some(payer) {
                return Ok(Some(VerificationResult::rejected(format!(
                    "Input {}:{} is not owned by payer {}",
                    prev_txid, prev_vout, payer
                ))));
            }
        }
        Ok(None)
    }
}

/// One output must pay exactly `amount` to the payee.
fn validate_payee_output(
    tx: &BtcTransaction,
    payee: &str,
    amount: u64,
) -> Result<Option<VerificationResult>> {
    for output in &tx.vout {
        if output.script_pub_key.address.as_deref() == Some(payee) && output.value_sats()? == amount
        {
            return Ok(None);
        }
    }
    Ok(Some(VerificationResult::rejected(format!(
        "Transaction {} has no output paying {} sats to {}",
        tx.txid, amount, payee
    ))))
}

/// One `OP_RETURN` output must carry the proof.
fn validate_proof_output(
    tx: &BtcTransaction,
    request: &VerificationRequest,
) -> Option<VerificationResult> {
    let proof = request.proof_bytes()?;
    let carried = tx
        .vout
        .iter()
        .filter_map(|output| op_return_payload(&output.script_pub_key.hex))
        .any(|payload| payload == proof);
    if carried {
        None
    } else {
        Some(VerificationResult::rejected(format!(
            "Transaction {} does not carry the payment proof",
            tx.txid
        )))
    }
}
