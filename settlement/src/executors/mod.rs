//! Settlement Executors
//!
//! One executor per chain kind, selected by the `type` tag of the chain
//! configuration. Each executor knows how to check its configuration, check
//! the resolved parties, broadcast the payment leg(s), and report how deeply
//! a leg is confirmed. The shared state machine lives in `engine`.

pub mod bitcoin;
pub mod erc20;
pub mod erc20_gateway;
pub mod ethereum;

use chain_clients_evm::{parse_address, EvmClient, EvmSigner, InclusionState, LegacyTransaction};

use crate::config::ChainConfig;
use crate::error::SettlementError;
use crate::resolve::ResolvedTransfer;

pub use bitcoin::BitcoinExecutor;
pub use erc20::Erc20Executor;
pub use erc20_gateway::{GatewayExecutor, GatewayProgress};
pub use ethereum::EthereumExecutor;

/// Confirmation state of the leg a progress token points at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegState {
    /// Not mined yet
    Unconfirmed,
    /// Mined and successful, `depth` blocks deep
    Confirmed { depth: u64 },
    /// Mined but execution failed
    Reverted,
}

impl LegState {
    pub fn depth(&self) -> u64 {
        match self {
            LegState::Confirmed { depth } => *depth,
            _ => 0,
        }
    }
}

/// Executor for one configured chain
pub enum ChainExecutor {
    Bitcoin(BitcoinExecutor),
    Ethereum(EthereumExecutor),
    Erc20(Erc20Executor),
    Erc20Gateway(GatewayExecutor),
}

impl ChainExecutor {
    /// Builds the executor matching a chain configuration.
    pub fn from_config(config: &ChainConfig) -> anyhow::Result<Self> {
        Ok(match config {
            ChainConfig::Bitcoin(cfg) => ChainExecutor::Bitcoin(BitcoinExecutor::new(cfg.clone())?),
            ChainConfig::Ethereum(cfg) => {
                ChainExecutor::Ethereum(EthereumExecutor::new(cfg.clone())?)
            }
            ChainConfig::Erc20(cfg) => ChainExecutor::Erc20(Erc20Executor::new(cfg.clone())?),
            ChainConfig::Erc20Gateway(cfg) => {
                ChainExecutor::Erc20Gateway(GatewayExecutor::new(cfg.clone())?)
            }
        })
    }

    /// Checks secret, RPC URL and per-kind settings before anything else runs.
    pub fn check_config(&self) -> Result<(), SettlementError> {
        match self {
            ChainExecutor::Bitcoin(e) => e.check_config(),
            ChainExecutor::Ethereum(e) => e.check_config(),
            ChainExecutor::Erc20(e) => e.check_config(),
            ChainExecutor::Erc20Gateway(e) => e.check_config(),
        }
    }

    /// Chain-specific checks of the resolved parties (address shapes, contract
    /// prefixes, payer key ownership).
    pub async fn prepare(&self, transfer: &ResolvedTransfer) -> Result<(), SettlementError> {
        match self {
            ChainExecutor::Bitcoin(e) => e.prepare(transfer).await,
            ChainExecutor::Ethereum(e) => e.prepare(transfer),
            ChainExecutor::Erc20(e) => e.prepare(transfer),
            ChainExecutor::Erc20Gateway(e) => e.prepare(transfer),
        }
    }

    /// Builds and broadcasts the first leg and returns its progress token.
    pub async fn broadcast(&self, transfer: &ResolvedTransfer) -> Result<String, SettlementError> {
        match self {
            ChainExecutor::Bitcoin(e) => e.broadcast(transfer).await,
            ChainExecutor::Ethereum(e) => e.broadcast(transfer).await,
            ChainExecutor::Erc20(e) => e.broadcast(transfer).await,
            ChainExecutor::Erc20Gateway(e) => e.broadcast(transfer).await,
        }
    }

    /// Reports the confirmation state of the leg `token` points at.
    pub async fn leg_state(&self, token: &str) -> Result<LegState, SettlementError> {
        match self {
            ChainExecutor::Bitcoin(e) => e.leg_state(token).await,
            ChainExecutor::Ethereum(e) => e.leg_state(token).await,
            ChainExecutor::Erc20(e) => e.leg_state(token).await,
            ChainExecutor::Erc20Gateway(e) => e.leg_state(token).await,
        }
    }

    /// Broadcasts the next leg after a confirmed non-final leg.
    ///
    /// Returns the replacement token, or `None` when `token` already points
    /// at the final leg.
    pub async fn next_leg(
        &self,
        token: &str,
        proof: &[u8; 32],
    ) -> Result<Option<String>, SettlementError> {
        match self {
            ChainExecutor::Erc20Gateway(e) => e.next_leg(token, proof).await,
            _ => Ok(None),
        }
    }

    /// Transaction the token currently points at, for error reporting.
    pub fn current_txid(&self, token: &str) -> String {
        match self {
            ChainExecutor::Erc20Gateway(_) => match GatewayProgress::parse(token) {
                Ok(progress) => progress.txid().to_string(),
                Err(_) => token.to_string(),
            },
            _ => token.to_string(),
        }
    }

    /// External transaction id registered on the ledger for a final token.
    pub fn settled_txid(&self, token: &str) -> Result<String, SettlementError> {
        match self {
            ChainExecutor::Erc20Gateway(_) => match GatewayProgress::parse(token)? {
                GatewayProgress::Forwarded { txid } => Ok(txid),
                GatewayProgress::Approved { .. } => Err(SettlementError::Validation(format!(
                    "Progress token '{}' has not reached the final leg",
                    token
                ))),
            },
            _ => Ok(token.to_string()),
        }
    }
}

// ============================================================================
// SHARED HELPERS
// ============================================================================

/// Reads a secret from the environment variable named in configuration.
pub(crate) fn secret_from_env(chain: &str, var: &str) -> Result<String, SettlementError> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SettlementError::Config(format!(
            "Secret for chain '{}' is missing: environment variable {} is not set",
            chain, var
        ))),
    }
}

/// Fails when a configured RPC URL is blank.
pub(crate) fn require_rpc_url(chain: &str, rpc_url: &str) -> Result<(), SettlementError> {
    if rpc_url.trim().is_empty() {
        return Err(SettlementError::Config(format!(
            "Chain '{}' has no RPC URL",
            chain
        )));
    }
    Ok(())
}

/// Loads the EVM signer from its environment variable.
pub(crate) fn evm_signer(chain: &str, var: &str) -> Result<EvmSigner, SettlementError> {
    let secret = secret_from_env(chain, var)?;
    EvmSigner::from_hex(&secret).map_err(|e| {
        SettlementError::Config(format!("Secret for chain '{}' is invalid: {:#}", chain, e))
    })
}

/// Signs and broadcasts a legacy transaction and returns its hash.
pub(crate) async fn send_evm_transaction(
    client: &EvmClient,
    signer: &EvmSigner,
    gas_price: Option<u64>,
    to: &str,
    value: u128,
    data: Vec<u8>,
) -> anyhow::Result<String> {
    let from = signer.address();
    let to_bytes = parse_address(to)?;
    let nonce = client.get_transaction_count(&from).await?;
    let gas_price = match gas_price {
        Some(price) => price as u128,
        None => client.gas_price().await?,
    };
    let gas_limit = client.estimate_gas(&from, to, value, &data).await?;
    let chain_id = client.get_chain_id().await?;

    let raw = signer.sign(&LegacyTransaction {
        nonce,
        gas_price,
        gas_limit,
        to: to_bytes,
        value,
        data,
        chain_id,
    })
    .await?;
    client.send_raw_transaction(&raw).await
}

/// Maps an EVM receipt lookup onto a leg state.
pub(crate) async fn evm_leg_state(
    client: &EvmClient,
    txid: &str,
) -> Result<LegState, SettlementError> {
    let state = client
        .inclusion_state(txid)
        .await
        .map_err(|e| SettlementError::transient(e, true))?;
    Ok(match state {
        InclusionState::Pending => LegState::Unconfirmed,
        InclusionState::Included { depth } => LegState::Confirmed { depth },
        InclusionState::Reverted { .. } => LegState::Reverted,
    })
}

/// Parses an EVM address from a ledger address value.
pub(crate) fn check_evm_address(role: &str, address: &str) -> Result<(), SettlementError> {
    parse_address(address).map(|_| ()).map_err(|e| {
        SettlementError::Validation(format!("{} address '{}' is invalid: {:#}", role, address, e))
    })
}
