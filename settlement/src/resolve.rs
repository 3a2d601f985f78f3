//! Order resolution
//!
//! Turns a settlement command into a concrete payment: who pays whom, how
//! much, on which network, and the proof bytes that tie the payment to the
//! order.

use chain_clients_ledger::{AddressRecord, OrderResolver};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::SettlementError;

/// A request to settle one order on one chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementCommand {
    pub order_id: String,
    /// Signed amount added to the order amount. The literal "0" pays from the
    /// order's source to its destination; anything else pays the other way.
    pub gain: String,
    /// Key of the progress token; defaults to the order id
    pub progress_id: Option<String>,
}

impl SettlementCommand {
    pub fn new(order_id: impl Into<String>, gain: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            gain: gain.into(),
            progress_id: None,
        }
    }

    pub fn with_progress_id(mut self, progress_id: impl Into<String>) -> Self {
        self.progress_id = Some(progress_id.into());
        self
    }

    pub fn progress_id(&self) -> &str {
        self.progress_id.as_deref().unwrap_or(&self.order_id)
    }

    /// Ledger command registering a completed payment
    pub fn registration(&self, txid: &str) -> Vec<String> {
        vec![
            "RegisterTransfer".to_string(),
            self.gain.clone(),
            self.order_id.clone(),
            txid.to_string(),
        ]
    }
}

/// A payment ready to be built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTransfer {
    pub order_id: String,
    pub src: AddressRecord,
    pub dst: AddressRecord,
    pub amount: u64,
    pub proof: [u8; 32],
}

/// Payment proof embedded in the external transaction: SHA-256 of the order id
pub fn payment_proof(order_id: &str) -> [u8; 32] {
    let digest = Sha256::digest(order_id.as_bytes());
    let mut proof = [0u8; 32];
    proof.copy_from_slice(&digest);
    proof
}

/// Adds the signed gain to the order amount, rejecting negative or overflowing results.
pub fn transfer_amount(order_amount: u64, gain: &str) -> Result<u64, SettlementError> {
    let gain: i64 = gain
        .trim()
        .parse()
        .map_err(|_| SettlementError::Validation(format!("Gain '{}' is not an integer", gain)))?;
    let total = order_amount as i128 + gain as i128;
    if total < 0 {
        return Err(SettlementError::Validation(format!(
            "Transfer amount {} + {} is negative",
            order_amount, gain
        )));
    }
    u64::try_from(total).map_err(|_| {
        SettlementError::Validation(format!(
            "Transfer amount {} + {} overflows",
            order_amount, gain
        ))
    })
}

/// Resolves the order and both addresses and checks they belong to this chain.
///
/// # Arguments
///
/// * `resolver` - Ledger record reader
/// * `chain_type` - Blockchain tag the addresses must carry
/// * `network` - Network pinned in configuration, if any
/// * `command` - Order id and gain
pub async fn resolve_transfer(
    resolver: &OrderResolver,
    chain_type: &str,
    network: Option<&str>,
    command: &SettlementCommand,
) -> Result<ResolvedTransfer, SettlementError> {
    let order = resolver
        .order(&command.order_id)
        .await
        .map_err(SettlementError::ledger)?
        .ok_or_else(|| {
            SettlementError::Validation(format!("Order {} not found", command.order_id))
        })?;

    let dst_id = order.dst_address.clone().ok_or_else(|| {
        SettlementError::Validation(format!("Order {} has no destination address", order.id))
    })?;
    let (payer_id, payee_id) = if command.gain == "0" {
        (order.src_address.clone(), dst_id)
    } else {
        (dst_id, order.src_address.clone())
    };

    let src = fetch_address(resolver, &payer_id).await?;
    let dst = fetch_address(resolver, &payee_id).await?;

    for address in [&src, &dst] {
        if address.blockchain != chain_type {
            return Err(SettlementError::Validation(format!(
                "Address {} belongs to chain '{}', not '{}'",
                address.id, address.blockchain, chain_type
            )));
        }
    }
    if src.network != dst.network {
        return Err(SettlementError::Validation(format!(
            "Addresses are on different networks ('{}' and '{}')",
            src.network, dst.network
        )));
    }
    if let Some(expected) = network {
        if src.network != expected {
            return Err(SettlementError::Validation(format!(
                "Addresses are on network '{}' but this chain is configured for '{}'",
                src.network, expected
            )));
        }
    }

    let amount = transfer_amount(order.amount, &command.gain)?;
    debug!(
        "Resolved order {}: {} -> {} amount {}",
        order.id, src.value, dst.value, amount
    );

    Ok(ResolvedTransfer {
        order_id: order.id,
        src,
        dst,
        amount,
        proof: payment_proof(&command.order_id),
    })
}

async fn fetch_address(
    resolver: &OrderResolver,
    id: &str,
) -> Result<AddressRecord, SettlementError> {
    resolver
        .address(id)
        .await
        .map_err(SettlementError::ledger)?
        .ok_or_else(|| SettlementError::Validation(format!("Address {} not found", id)))
}
