//! Payment Proof Validation Module
//!
//! Checks that a transaction on an external chain is the payment described by
//! a verification request: right sender, right recipient, right amount, and
//! carrying the expected payment proof, buried deep enough in the chain.
//!
//! Verifiers are stateless and never fail. Node errors, malformed requests and
//! mismatches all come back as a [`VerificationResult`] with `valid = false`.

use anyhow::Result;
use chain_clients_common::strip_hex_prefix;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{info, warn};

use crate::config::{ChainConfig, VerifierConfig};

pub mod bitcoin;
pub mod erc20;
pub mod erc20_gateway;
pub mod ethereum;

pub use bitcoin::BitcoinVerifier;
pub use erc20::Erc20Verifier;
pub use erc20_gateway::GatewayVerifier;
pub use ethereum::EthereumVerifier;

// ============================================================================
// VALIDATION DATA STRUCTURES
// ============================================================================

/// A payment claim to check against an external chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRequest {
    /// Payer address as stored on the ledger (`contract@wallet` on token chains)
    pub src: String,
    /// Payee address as stored on the ledger
    pub dst: String,
    /// Hex-encoded 32-byte payment proof
    pub proof: String,
    /// Expected amount in the chain's smallest unit
    pub amount: u64,
    /// External transaction id
    pub txid: String,
    /// Network the payment is claimed on (bitcoin chain name or EVM chain id)
    pub network_id: String,
}

impl VerificationRequest {
    /// Decodes the proof into its 32 raw bytes.
    pub fn proof_bytes(&self) -> Option<[u8; 32]> {
        hex::decode(strip_hex_prefix(&self.proof))
            .ok()?
            .try_into()
            .ok()
    }
}

/// Result of a verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Whether the payment matched the request
    pub valid: bool,
    /// Detailed reason for the result
    pub message: String,
    /// Timestamp when verification was performed
    pub timestamp: u64,
}

impl VerificationResult {
    pub fn accepted(message: impl Into<String>) -> Self {
        Self {
            valid: true,
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            valid: false,
            message: message.into(),
            timestamp: chrono::Utc::now().timestamp() as u64,
        }
    }
}

// ============================================================================
// SHARED CHECKS
// ============================================================================

/// Rejects a request whose proof is not 32 hex-encoded bytes.
pub(crate) fn validate_proof_format(request: &VerificationRequest) -> Option<VerificationResult> {
    match request.proof_bytes() {
        Some(_) => None,
        None => Some(VerificationResult::rejected(format!(
            "Payment proof '{}' is not 32 hex-encoded bytes",
            request.proof
        ))),
    }
}

/// Rejects a transaction that is not buried under enough blocks yet.
pub(crate) fn validate_depth(txid: &str, depth: u64, required: u64) -> Option<VerificationResult> {
    if depth < required {
        return Some(VerificationResult::rejected(format!(
            "Transaction {} has {} confirmation(s), {} required",
            txid, depth, required
        )));
    }
    None
}

/// Accepts a decimal (`1`) or hex (`0x1`) chain id from the request.
pub(crate) fn parse_network_chain_id(network_id: &str) -> Option<u64> {
    let trimmed = network_id.trim();
    if trimmed.starts_with("0x") || trimmed.starts_with("0X") {
        chain_clients_common::parse_hex_u64(trimmed).ok()
    } else {
        trimmed.parse().ok()
    }
}

// ============================================================================
// VERIFIER REGISTRY
// ============================================================================

/// One verifier per chain kind, selected by the configured `type`.
pub enum ProofVerifier {
    Bitcoin(BitcoinVerifier),
    Ethereum(EthereumVerifier),
    Erc20(Erc20Verifier),
    Erc20Gateway(GatewayVerifier),
}

impl ProofVerifier {
    pub fn from_config(config: &ChainConfig) -> Result<Self> {
        Ok(match config {
            ChainConfig::Bitcoin(cfg) => ProofVerifier::Bitcoin(BitcoinVerifier::new(cfg.clone())?),
            ChainConfig::Ethereum(cfg) => {
                ProofVerifier::Ethereum(EthereumVerifier::new(cfg.clone())?)
            }
            ChainConfig::Erc20(cfg) => ProofVerifier::Erc20(Erc20Verifier::new(cfg.clone())?),
            ChainConfig::Erc20Gateway(cfg) => {
                ProofVerifier::Erc20Gateway(GatewayVerifier::new(cfg.clone())?)
            }
        })
    }

    /// Verifies a payment claim. Never fails: errors become rejections.
    ///
    /// # Arguments
    ///
    /// * `request` - The payment claim
    ///
    /// # Returns
    ///
    /// * `VerificationResult` - `valid = true` only if every field matched
    pub async fn verify(&self, request: &VerificationRequest) -> VerificationResult {
        let outcome = match self {
            ProofVerifier::Bitcoin(v) => v.check(request).await,
            ProofVerifier::Ethereum(v) => v.check(request).await,
            ProofVerifier::Erc20(v) => v.check(request).await,
            ProofVerifier::Erc20Gateway(v) => v.check(request).await,
        };

        match outcome {
            Ok(result) => {
                if result.valid {
                    info!("Payment {} verified: {}", request.txid, result.message);
                } else {
                    info!("Payment {} rejected: {}", request.txid, result.message);
                }
                result
            }
            Err(e) => {
                warn!("Verification of {} failed: {:#}", request.txid, e);
                VerificationResult::rejected(format!("Verification failed: {:#}", e))
            }
        }
    }
}

/// Verifiers keyed by configured chain name.
pub struct VerifierRegistry {
    verifiers: HashMap<String, ProofVerifier>,
}

impl VerifierRegistry {
    /// Builds one verifier per configured chain.
    pub fn from_config(config: &VerifierConfig) -> Result<Self> {
        let mut verifiers = HashMap::new();
        for chain in &config.chain {
            verifiers.insert(chain.name().to_string(), ProofVerifier::from_config(chain)?);
        }
        Ok(Self { verifiers })
    }

    pub fn get(&self, chain: &str) -> Option<&ProofVerifier> {
        self.verifiers.get(chain)
    }

    /// Configured chain names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.verifiers.keys().cloned().collect();
        names.sort();
        names
    }
}
