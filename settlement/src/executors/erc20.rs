//! Token executor (direct transfer)
//!
//! Calls the token's transfer function with `(payee wallet, amount)` and
//! appends the 32-byte payment proof after the encoded arguments.

use chain_clients_common::{hex_addresses_equal, CompoundAddress};
use chain_clients_evm::{encode_call, EvmClient, FunctionSignature, Token};
use tracing::info;

use super::{
    check_evm_address, evm_leg_state, evm_signer, require_rpc_url, send_evm_transaction, LegState,
};
use crate::config::TokenChainConfig;
use crate::error::SettlementError;
use crate::resolve::ResolvedTransfer;

pub struct Erc20Executor {
    config: TokenChainConfig,
    client: EvmClient,
}

/// Payer and payee split into their contract and wallet parts
pub(crate) struct TokenParties {
    pub token: String,
    pub payer: String,
    pub payee: String,
}

/// Splits both compound addresses and checks they name the same contract.
pub(crate) fn token_parties(transfer: &ResolvedTransfer) -> Result<TokenParties, SettlementError> {
    let src = CompoundAddress::parse(&transfer.src.value);
    let dst = CompoundAddress::parse(&transfer.dst.value);

    let token = match (&src.contract, &dst.contract) {
        (Some(token), Some(_)) if src.same_contract(&dst) => token.clone(),
        (Some(_), Some(_)) => {
            return Err(SettlementError::Validation(format!(
                "Payer and payee use different token contracts ({} and {})",
                transfer.src.value, transfer.dst.value
            )))
        }
        _ => {
            return Err(SettlementError::Validation(format!(
                "Token addresses must have the form contract@wallet ({} and {})",
                transfer.src.value, transfer.dst.value
            )))
        }
    };

    check_evm_address("Token", &token)?;
    check_evm_address("Payer", &src.wallet)?;
    check_evm_address("Payee", &dst.wallet)?;

    Ok(TokenParties {
        token,
        payer: src.wallet,
        payee: dst.wallet,
    })
}

impl Erc20Executor {
    pub fn new(config: TokenChainConfig) -> anyhow::Result<Self> {
        let client = EvmClient::new(&config.rpc_url)?;
        Ok(Self { config, client })
    }

    fn contract(&self) -> Result<&str, SettlementError> {
        self.config
            .contract_address
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| {
                SettlementError::Config(format!(
                    "Chain '{}' has no token contract configured",
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
        self.contract()?;
        self.signature()?;
        Ok(())
    }

    pub fn prepare(&self, transfer: &ResolvedTransfer) -> Result<(), SettlementError> {
        let parties = token_parties(transfer)?;
        let contract = self.contract()?;
        if !hex_addresses_equal(&parties.token, contract) {
            return Err(SettlementError::Validation(format!(
                "Token contract {} does not match the configured contract {}",
                parties.token, contract
            )));
        }

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

    pub async fn broadcast(&self, transfer: &ResolvedTransfer) -> Result<String, SettlementError> {
        let parties = token_parties(transfer)?;
        let signature = self.signature()?;
        let signer = evm_signer(&self.config.name, &self.config.secret_key_env)?;

        let mut data = encode_call(
            &signature,
            &[
                Token::Address(parties.payee.clone()),
                Token::Uint(transfer.amount as u128),
            ],
        )
        .map_err(|e| SettlementError::Config(format!("{:#}", e)))?;
        data.extend_from_slice(&transfer.proof);

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
            "Broadcast token transfer of {} from {} to {} on {}: {}",
            transfer.amount, parties.payer, parties.payee, self.config.name, txid
        );
        Ok(txid)
    }

    pub async fn leg_state(&self, token: &str) -> Result<LegState, SettlementError> {
        evm_leg_state(&self.client, token).await
    }
}
