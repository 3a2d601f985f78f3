//! Native-coin executor
//!
//! Pays from the payer's unspent outputs with a flat fee. Outputs are, in
//! order: the payee, an `OP_RETURN` carrying the payment proof, and change
//! back to the payer when it is above the dust limit.

use chain_clients_btc::{
    coins_to_sats, sats_to_coin_string, BtcClient, Utxo, WifKey, DUST_LIMIT_SATS,
};
use chain_clients_common::CompoundAddress;
use tracing::info;

use super::{require_rpc_url, secret_from_env, LegState};
use crate::config::BitcoinChainConfig;
use crate::error::SettlementError;
use crate::resolve::ResolvedTransfer;

pub struct BitcoinExecutor {
    config: BitcoinChainConfig,
    client: BtcClient,
}

impl BitcoinExecutor {
    pub fn new(config: BitcoinChainConfig) -> anyhow::Result<Self> {
        let credentials = match (&config.rpc_user, &config.rpc_password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };
        let client = BtcClient::new(&config.rpc_url, credentials)?;
        Ok(Self { config, client })
    }

    fn wif(&self) -> Result<String, SettlementError> {
        let wif = secret_from_env(&self.config.name, &self.config.secret_key_env)?;
        WifKey::decode(&wif).map_err(|e| {
            SettlementError::Config(format!(
                "Secret for chain '{}' is not a valid WIF key: {:#}",
                self.config.name, e
            ))
        })?;
        Ok(wif)
    }

    fn fee(&self) -> Result<u64, SettlementError> {
        self.config.fee.ok_or_else(|| {
            SettlementError::Config(format!("Chain '{}' has no fee configured", self.config.name))
        })
    }

    pub fn check_config(&self) -> Result<(), SettlementError> {
        self.wif()?;
        require_rpc_url(&self.config.name, &self.config.rpc_url)?;
        self.fee()?;
        Ok(())
    }

    pub async fn prepare(&self, transfer: &ResolvedTransfer) -> Result<(), SettlementError> {
        for address in [&transfer.src, &transfer.dst] {
            if CompoundAddress::parse(&address.value).contract.is_some() {
                return Err(SettlementError::Validation(format!(
                    "Address {} is a compound token address",
                    address.id
                )));
            }
        }
        if transfer.amount < DUST_LIMIT_SATS {
            return Err(SettlementError::Validation(format!(
                "Amount {} is below the dust limit of {} satoshis",
                transfer.amount, DUST_LIMIT_SATS
            )));
        }

        let own_address = self
            .client
            .address_for_key(&self.wif()?, &self.config.address_type)
            .await
            .map_err(|e| SettlementError::transient(e, false))?;
        if own_address != transfer.src.value {
            return Err(SettlementError::Validation(format!(
                "Configured key controls {} but the payer address is {}",
                own_address, transfer.src.value
            )));
        }
        Ok(())
    }

    pub async fn broadcast(&self, transfer: &ResolvedTransfer) -> Result<String, SettlementError> {
        let fee = self.fee()?;
        let wif = self.wif()?;
        let needed = transfer.amount.checked_add(fee).ok_or_else(|| {
            SettlementError::Validation(format!("Amount {} plus fee overflows", transfer.amount))
        })?;

        let utxos = self
            .client
            .scan_unspent(&transfer.src.value)
            .await
            .map_err(|e| SettlementError::transient(e, false))?;
        let (inputs, total) = select_coins(utxos, needed)?;

        let mut outputs = vec![
            output(&transfer.dst.value, sats_to_coin_string(transfer.amount)),
            output("data", hex::encode(transfer.proof)),
        ];
        let change = total - needed;
        if change >= DUST_LIMIT_SATS {
            outputs.push(output(&transfer.src.value, sats_to_coin_string(change)));
        }

        let send = async {
            let raw = self.client.create_raw_transaction(&inputs, outputs).await?;
            let signed = self
                .client
                .sign_raw_transaction_with_key(&raw, &wif)
                .await?;
            if !signed.complete {
                anyhow::bail!("Node could not fully sign the transaction");
            }
            self.client.send_raw_transaction(&signed.hex).await
        };
        let txid = send
            .await
            .map_err(|e| SettlementError::transient(e, false))?;

        info!(
            "Broadcast {} sats from {} to {} on {}: {}",
            transfer.amount, transfer.src.value, transfer.dst.value, self.config.name, txid
        );
        Ok(txid)
    }

    pub async fn leg_state(&self, token: &str) -> Result<LegState, SettlementError> {
        let confirmations = self
            .client
            .confirmations(token)
            .await
            .map_err(|e| SettlementError::transient(e, true))?;
        Ok(if confirmations == 0 {
            LegState::Unconfirmed
        } else {
            LegState::Confirmed {
                depth: confirmations,
            }
        })
    }
}

/// Picks the largest outputs first until `needed` satoshis are covered.
fn select_coins(
    utxos: Vec<Utxo>,
    needed: u64,
) -> Result<(Vec<(String, u32)>, u64), SettlementError> {
    let mut valued = Vec::with_capacity(utxos.len());
    for utxo in utxos {
        let sats = coins_to_sats(utxo.amount).map_err(|e| {
            SettlementError::Validation(format!(
                "Unspent output {}:{}: {:#}",
                utxo.txid, utxo.vout, e
            ))
        })?;
        valued.push((utxo, sats));
    }
    valued.sort_by(|a, b| b.1.cmp(&a.1));

    let mut inputs = Vec::new();
    let mut total: u64 = 0;
    for (utxo, sats) in valued {
        if total >= needed {
            break;
        }
        inputs.push((utxo.txid, utxo.vout));
        total = total.saturating_add(sats);
    }

    if total < needed {
        return Err(SettlementError::Validation(format!(
            "Insufficient funds: {} satoshis available, {} needed",
            total, needed
        )));
    }
    Ok((inputs, total))
}

/// Single-key output object for `createrawtransaction`
fn output(key: &str, value: String) -> serde_json::Value {
    let mut object = serde_json::Map::new();
    object.insert(key.to_string(), serde_json::Value::String(value));
    serde_json::Value::Object(object)
}
