//! Token executor (gateway transfer)
//!
//! Two legs. Leg 1 approves the configured gateway to spend `amount` of the
//! payer's tokens. Once leg 1 is confirmed, leg 2 calls the gateway's forward
//! function with `(token, payee wallet, amount, proof)`.
//!
//! Progress tokens:
//! - after leg 1: `txid:gateway:token@wallet:amount`
//! - after leg 2: the bare leg-2 txid

use std::fmt;

use chain_clients_common::{hex_addresses_equal, CompoundAddress};
use chain_clients_evm::{approve_calldata, encode_call, EvmClient, FunctionSignature, Token};
use tracing::info;

use super::erc20::token_parties;
use super::{
    check_evm_address, evm_leg_state, evm_signer, require_rpc_url, send_evm_transaction, LegState,
};
use crate::config::GatewayChainConfig;
use crate::error::SettlementError;
use crate::resolve::ResolvedTransfer;

/// Parsed gateway progress token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayProgress {
    /// Leg 1 broadcast; leg 2 still to do
    Approved {
        txid: String,
        gateway: String,
        token: String,
        wallet: String,
        amount: u64,
    },
    /// Leg 2 broadcast
    Forwarded { txid: String },
}

impl GatewayProgress {
    pub fn parse(token: &str) -> Result<Self, SettlementError> {
        let invalid = || {
            SettlementError::Validation(format!("Malformed gateway progress token '{}'", token))
        };
        let parts: Vec<&str> = token.split(':').collect();
        match parts.as_slice() {
            [txid] if !txid.is_empty() => Ok(GatewayProgress::Forwarded {
                txid: txid.to_string(),
            }),
            [txid, gateway, destination, amount] => {
                let destination = CompoundAddress::parse(destination);
                let token_contract = destination.contract.ok_or_else(invalid)?;
                let amount = amount.parse().map_err(|_| invalid())?;
                if txid.is_empty() || gateway.is_empty() {
                    return Err(invalid());
                }
                Ok(GatewayProgress::Approved {
                    txid: txid.to_string(),
                    gateway: gateway.to_string(),
                    token: token_contract,
                    wallet: destination.wallet,
                    amount,
                })
            }
            _ => Err(invalid()),
        }
    }

    /// Transaction the token currently points at
    pub fn txid(&self) -> &str {
        match self {
            GatewayProgress::Approved { txid, .. } => txid,
            GatewayProgress::Forwarded { txid } => txid,
        }
    }
}

impl fmt::Display for GatewayProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GatewayProgress::Approved {
                txid,
                gateway,
                token,
                wallet,
                amount,
            } => write!(f, "{}:{}:{}@{}:{}", txid, gateway, token, wallet, amount),
            GatewayProgress::Forwarded { txid } => write!(f, "{}", txid),
        }
    }
}

pub struct GatewayExecutor {
    config: GatewayChainConfig,
    client: EvmClient,
}

impl GatewayExecutor {
    pub fn new(config: GatewayChainConfig) -> anyhow::Result<Self> {
        let client = EvmClient::new(&config.rpc_url)?;
        Ok(Self { config, client })
    }

    fn gateway(&self) -> Result<&str, SettlementError> {
        self.config
            .contract_address
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                SettlementError::Config(format!(
                    "Chain '{}' has no gateway contract configured",
                    self.config.name
                ))
            })
    }

    fn signature(&self) -> Result<FunctionSignature, SettlementError> {
        FunctionSignature::parse(&self.config.function_signature).map_err(|e| {
            SettlementError::Config(format!(
                "Chain '{}' has an invalid function signature: {:#}",
                self.config.name, e
            ))
        })
    }

    pub fn check_config(&self) -> Result<(), SettlementError> {
        evm_signer(&self.config.name, &self.config.secret_key_env)?;
        require_rpc_url(&self.config.name, &self.config.rpc_url)?;
        self.gateway()?;
        self.signature()?;
        Ok(())
    }

    pub fn prepare(&self, transfer: &ResolvedTransfer) -> Result<(), SettlementError> {
        let parties = token_parties(transfer)?;
        let signer = evm_signer(&self.config.name, &self.config.secret_key_env)?;
        if !hex_addresses_equal(&signer.address(), &parties.payer) {
            return Err(SettlementError::Validation(format!(
                "Configured key controls {} but the payer wallet is {}",
                signer.address(),
                parties.payer
            )));
        }
        Ok(())
    }

    /// Broadcasts leg 1 (`approve`) and returns the multi-part token.
    pub async fn broadcast(&self, transfer: &ResolvedTransfer) -> Result<String, SettlementError> {
        let parties = token_parties(transfer)?;
        let gateway = self.gateway()?.to_string();
        check_evm_address("Gateway", &gateway)?;
        let signer = evm_signer(&self.config.name, &self.config.secret_key_env)?;

        let data = approve_calldata(&gateway, transfer.amount as u128)
            .map_err(|e| SettlementError::Config(format!("{:#}", e)))?;

        let txid = send_evm_transaction(
            &self.client,
            &signer,
            self.config.gas_price,
            &parties.token,
            0,
            data,
        )
        .await
        .map_err(|e| SettlementError::transient(e, false))?;

        info!(
            "Approved gateway {} for {} of token {} on {}: {}",
            gateway, transfer.amount, parties.token, self.config.name, txid
        );

        Ok(GatewayProgress::Approved {
            txid,
            gateway,
            token: parties.token,
            wallet: parties.payee,
            amount: transfer.amount,
        }
        .to_string())
    }

    /// Broadcasts leg 2 once leg 1 is confirmed.
    ///
    /// Returns `None` when `token` already points at leg 2.
    pub async fn next_leg(
        &self,
        token: &str,
        proof: &[u8; 32],
    ) -> Result<Option<String>, SettlementError> {
        let (gateway, token_contract, wallet, amount) = match GatewayProgress::parse(token)? {
            GatewayProgress::Forwarded { .. } => return Ok(None),
            GatewayProgress::Approved {
                gateway,
                token,
                wallet,
                amount,
                ..
            } => (gateway, token, wallet, amount),
        };

        let signature = self.signature()?;
        let signer = evm_signer(&self.config.name, &self.config.secret_key_env)?;
        let data = encode_call(
            &signature,
            &[
                Token::Address(token_contract.clone()),
                Token::Address(wallet.clone()),
                Token::Uint(amount as u128),
                Token::Bytes32(hex::encode(proof)),
            ],
        )
        .map_err(|e| SettlementError::Config(format!("{:#}", e)))?;

        // Leg 1 is confirmed and recorded, so the token stays valid on failure
        let txid = send_evm_transaction(
            &self.client,
            &signer,
            self.config.gas_price,
            &gateway,
            0,
            data,
        )
        .await
        .map_err(|e| SettlementError::transient(e, true))?;

        info!(
            "Forwarded {} of token {} to {} through {} on {}: {}",
            amount, token_contract, wallet, gateway, self.config.name, txid
        );
        Ok(Some(GatewayProgress::Forwarded { txid }.to_string()))
    }

    pub async fn leg_state(&self, token: &str) -> Result<LegState, SettlementError> {
        let progress = GatewayProgress::parse(token)?;
        evm_leg_state(&self.client, progress.txid()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GATEWAY: &str = "0x00000000000000000000000000000000000000aa";
    const TOKEN: &str = "0x00000000000000000000000000000000000000bb";
    const WALLET: &str = "0x00000000000000000000000000000000000000cc";

    #[test]
    fn approved_token_round_trips_through_display() {
        let raw = format!("0xabc:{}:{}@{}:1000", GATEWAY, TOKEN, WALLET);
        let progress = GatewayProgress::parse(&raw).unwrap();
        assert_eq!(
            progress,
            GatewayProgress::Approved {
                txid: "0xabc".to_string(),
                gateway: GATEWAY.to_string(),
                token: TOKEN.to_string(),
                wallet: WALLET.to_string(),
                amount: 1000,
            }
        );
        assert_eq!(progress.to_string(), raw);
        assert_eq!(progress.txid(), "0xabc");
    }

    #[test]
    fn bare_txid_is_the_final_leg() {
        assert_eq!(
            GatewayProgress::parse("0xdef").unwrap(),
            GatewayProgress::Forwarded {
                txid: "0xdef".to_string()
            }
        );
    }

    #[test]
    fn malformed_tokens_are_rejected() {
        for raw in ["", "a:b", "0xabc:gw:nowallet:10", "0xabc:gw:t@w:ten"] {
            assert!(
                matches!(GatewayProgress::parse(raw), Err(SettlementError::Validation(_))),
                "{}",
                raw
            );
        }
    }
}
