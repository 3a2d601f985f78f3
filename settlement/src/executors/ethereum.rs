//! Account-based executor
//!
//! Sends the amount as the transaction value with the payment proof as
//! calldata.

use chain_clients_common::{hex_addresses_equal, CompoundAddress};
use chain_clients_evm::EvmClient;
use tracing::info;

use super::{
    check_evm_address, evm_leg_state, evm_signer, require_rpc_url, send_evm_transaction, LegState,
};
use crate::config::EthereumChainConfig;
use crate::error::SettlementError;
use crate::resolve::ResolvedTransfer;

pub struct EthereumExecutor {
    config: EthereumChainConfig,
    client: EvmClient,
}

impl EthereumExecutor {
    pub fn new(config: EthereumChainConfig) -> anyhow::Result<Self> {
        let client = EvmClient::new(&config.rpc_url)?;
        Ok(Self { config, client })
    }

    pub fn check_config(&self) -> Result<(), SettlementError> {
        evm_signer(&self.config.name, &self.config.secret_key_env)?;
        require_rpc_url(&self.config.name, &self.config.rpc_url)
    }

    pub fn prepare(&self, transfer: &ResolvedTransfer) -> Result<(), SettlementError> {
        for (role, address) in [("Payer", &transfer.src), ("Payee", &transfer.dst)] {
            if CompoundAddress::parse(&address.value).contract.is_some() {
                return Err(SettlementError::Validation(format!(
                    "{} address {} is a compound token address",
                    role, address.id
                )));
            }
            check_evm_address(role, &address.value)?;
        }

        let signer = evm_signer(&self.config.name, &self.config.secret_key_env)?;
        if !hex_addresses_equal(&signer.address(), &transfer.src.value) {
            return Err(SettlementError::Validation(format!(
                "Configured key controls {} but the payer address is {}",
                signer.address(),
                transfer.src.value
            )));
        }
        Ok(())
    }

    pub async fn broadcast(&self, transfer: &ResolvedTransfer) -> Result<String, SettlementError> {
        let signer = evm_signer(&self.config.name, &self.config.secret_key_env)?;
        let txid = send_evm_transaction(
            &self.client,
            &signer,
            self.config.gas_price,
            &transfer.dst.value,
            transfer.amount as u128,
            transfer.proof.to_vec(),
        )
        .await
        .map_err(|e| SettlementError::transient(e, false))?;

        info!(
            "Broadcast {} wei from {} to {} on {}: {}",
            transfer.amount, transfer.src.value, transfer.dst.value, self.config.name, txid
        );
        Ok(txid)
    }

    pub async fn leg_state(&self, token: &str) -> Result<LegState, SettlementError> {
        evm_leg_state(&self.client, token).await
    }
}
