//! Bitcoin Core JSON-RPC Client
//!
//! Talks to a `bitcoind` node. Transaction construction and signing are
//! delegated to the node (`createrawtransaction`,
//! `signrawtransactionwithkey`), so the node never needs a wallet holding the
//! settlement key.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::keys::{coins_to_sats, WifKey};

/// Error code bitcoind returns for unknown transactions / addresses
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;

// ============================================================================
// API RESPONSE STRUCTURES
// ============================================================================

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'a str,
    id: &'a str,
    method: &'a str,
    params: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Failure reported by the node itself (as opposed to a transport failure)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeError {
    pub code: i64,
    pub message: String,
}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "bitcoind error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for NodeError {}

/// Verbose transaction as returned by `getrawtransaction <txid> true`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BtcTransaction {
    pub txid: String,
    /// Absent while the transaction is unconfirmed
    #[serde(default)]
    pub confirmations: Option<u64>,
    pub vin: Vec<BtcInput>,
    pub vout: Vec<BtcOutput>,
}

/// Transaction input (coinbase inputs carry no txid)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BtcInput {
    pub txid: Option<String>,
    pub vout: Option<u32>,
}

/// Transaction output
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BtcOutput {
    /// Value in coins
    pub value: f64,
    pub n: u32,
    #[serde(rename = "scriptPubKey")]
    pub script_pub_key: ScriptPubKey,
}

impl BtcOutput {
    /// Output value in satoshis
    pub fn value_sats(&self) -> Result<u64> {
        coins_to_sats(self.value)
    }
}

/// Output script summary
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScriptPubKey {
    pub hex: String,
    #[serde(rename = "type", default)]
    pub script_type: Option<String>,
    /// Present for standard scripts on recent node versions
    #[serde(default)]
    pub address: Option<String>,
}

/// Unspent output owned by an address
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    /// Value in coins
    pub amount: f64,
    #[serde(default)]
    pub confirmations: u64,
}

/// Subset of the `scantxoutset` result
#[derive(Debug, Deserialize)]
struct ScanResult {
    success: bool,
    /// Tip height at scan time
    #[serde(default)]
    height: u64,
    #[serde(default)]
    unspents: Vec<ScanUnspent>,
}

#[derive(Debug, Deserialize)]
struct ScanUnspent {
    txid: String,
    vout: u32,
    amount: f64,
    /// Height of the block holding the output
    #[serde(default)]
    height: u64,
}

/// Subset of `getblockchaininfo`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlockchainInfo {
    /// Network name: "main", "test", "signet", "regtest"
    pub chain: String,
    pub blocks: u64,
}

/// Result of `signrawtransactionwithkey`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SignedTransaction {
    pub hex: String,
    pub complete: bool,
}

#[derive(Debug, Deserialize)]
struct DescriptorInfo {
    descriptor: String,
}

// ============================================================================
// BTC CLIENT IMPLEMENTATION
// ============================================================================

/// Client for a Bitcoin Core node
#[derive(Clone)]
pub struct BtcClient {
    client: Client,
    base_url: String,
    credentials: Option<(String, String)>,
}

impl BtcClient {
    /// Creates a new client
    ///
    /// # Arguments
    ///
    /// * `node_url` - RPC endpoint (e.g., "http://127.0.0.1:18443")
    /// * `credentials` - Optional RPC user and password
    ///
    /// # Returns
    ///
    /// * `Ok(BtcClient)` - Successfully created client
    /// * `Err(anyhow::Error)` - Failed to create client
    pub fn new(node_url: &str, credentials: Option<(String, String)>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: node_url.to_string(),
            credentials,
        })
    }

    /// Returns the base URL of this client
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T> {
        let request = JsonRpcRequest {
            jsonrpc: "1.0",
            id: "chain-clients-btc",
            method,
            params,
        };

        debug!("bitcoind RPC {} -> {}", method, self.base_url);

        let mut builder = self.client.post(&self.base_url).json(&request);
        if let Some((user, password)) = &self.credentials {
            builder = builder.basic_auth(user, Some(password));
        }

        // bitcoind answers RPC errors with HTTP 500 and a JSON body, so the
        // status code is not checked before parsing.
        let response: JsonRpcResponse<T> = builder
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to {}", method, self.base_url))?
            .json()
            .await
            .with_context(|| {
                format!("Failed to parse {} response from {}", method, self.base_url)
            })?;

        if let Some(error) = response.error {
            return Err(NodeError {
                code: error.code,
                message: error.message,
            }
            .into());
        }

        response
            .result
            .ok_or_else(|| anyhow::anyhow!("No result in {} response", method))
    }

    /// Fetches a verbose transaction; `None` if the node does not know it.
    pub async fn get_raw_transaction(&self, txid: &str) -> Result<Option<BtcTransaction>> {
        match self
            .call::<BtcTransaction>(
                "getrawtransaction",
                vec![serde_json::json!(txid), serde_json::json!(true)],
            )
            .await
        {
            Ok(tx) => Ok(Some(tx)),
            Err(e) => match e.downcast_ref::<NodeError>() {
                Some(node) if node.code == RPC_INVALID_ADDRESS_OR_KEY => Ok(None),
                _ => Err(e),
            },
        }
    }

    /// Number of confirmations of a transaction (0 while unconfirmed or unknown)
    pub async fn confirmations(&self, txid: &str) -> Result<u64> {
        Ok(self
            .get_raw_transaction(txid)
            .await?
            .and_then(|tx| tx.confirmations)
            .unwrap_or(0))
    }

    /// Returns the network name and height
    pub async fn get_blockchain_info(&self) -> Result<BlockchainInfo> {
        self.call("getblockchaininfo", vec![]).await
    }

    /// Lists confirmed unspent outputs of an address
    ///
    /// Scans the node's UTXO set with `scantxoutset`, which needs no loaded
    /// wallet. Only one scan can run on a node at a time.
    pub async fn scan_unspent(&self, address: &str) -> Result<Vec<Utxo>> {
        let scan: ScanResult = self
            .call(
                "scantxoutset",
                vec![
                    serde_json::json!("start"),
                    serde_json::json!([format!("addr({})", address)]),
                ],
            )
            .await?;
        if !scan.success {
            anyhow::bail!("UTXO scan for {} did not complete", address);
        }

        Ok(scan
            .unspents
            .into_iter()
            .map(|unspent| Utxo {
                confirmations: if unspent.height == 0 {
                    0
                } else {
                    scan.height.saturating_sub(unspent.height) + 1
                },
                txid: unspent.txid,
                vout: unspent.vout,
                amount: unspent.amount,
            })
            .collect())
    }

    /// Builds an unsigned transaction
    ///
    /// # Arguments
    ///
    /// * `inputs` - Outpoints to spend
    /// * `outputs` - Ordered outputs as single-key objects (`{address: amount}` or `{"data": hex}`)
    pub async fn create_raw_transaction(
        &self,
        inputs: &[(String, u32)],
        outputs: Vec<serde_json::Value>,
    ) -> Result<String> {
        let inputs: Vec<serde_json::Value> = inputs
            .iter()
            .map(|(txid, vout)| serde_json::json!({ "txid": txid, "vout": vout }))
            .collect();
        self.call(
            "createrawtransaction",
            vec![serde_json::json!(inputs), serde_json::json!(outputs)],
        )
        .await
    }

    /// Signs a raw transaction with the given WIF key
    pub async fn sign_raw_transaction_with_key(
        &self,
        raw_hex: &str,
        wif: &str,
    ) -> Result<SignedTransaction> {
        self.call(
            "signrawtransactionwithkey",
            vec![serde_json::json!(raw_hex), serde_json::json!([wif])],
        )
        .await
    }

    /// Broadcasts a signed transaction and returns its txid
    pub async fn send_raw_transaction(&self, signed_hex: &str) -> Result<String> {
        self.call("sendrawtransaction", vec![serde_json::json!(signed_hex)])
            .await
    }

    /// Derives the address a WIF key controls for the given script type
    ///
    /// # Arguments
    ///
    /// * `wif` - Private key in wallet import format
    /// * `address_type` - Descriptor function, e.g. "wpkh" or "pkh"
    pub async fn address_for_key(&self, wif: &str, address_type: &str) -> Result<String> {
        let key = WifKey::decode(wif)?;
        let descriptor = format!("{}({})", address_type, key.public_key_hex()?);

        let info: DescriptorInfo = self
            .call("getdescriptorinfo", vec![serde_json::json!(descriptor)])
            .await
            .context("Failed to checksum key descriptor")?;

        let addresses: Vec<String> = self
            .call("deriveaddresses", vec![serde_json::json!(info.descriptor)])
            .await
            .context("Failed to derive address from key descriptor")?;

        addresses
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Node derived no address for descriptor"))
    }
}
