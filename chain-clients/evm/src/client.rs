//! EVM JSON-RPC Client
//!
//! Client for communicating with EVM-compatible nodes. Covers the reads the
//! proof verifiers need (transactions, receipts, chain head, chain id) and the
//! writes the settlement executors need (nonce, gas, raw broadcast).

use anyhow::{Context, Result};
use chain_clients_common::{parse_hex_u128, parse_hex_u64};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

// ============================================================================
// API RESPONSE STRUCTURES
// ============================================================================

/// EVM JSON-RPC request wrapper
#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: Vec<serde_json::Value>,
    id: u64,
}

/// EVM JSON-RPC response wrapper
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

/// EVM transaction details from JSON-RPC
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvmTransaction {
    /// Transaction hash
    pub hash: String,
    /// Block number (hex string, None while pending)
    #[serde(rename = "blockNumber")]
    pub block_number: Option<String>,
    /// Sender address
    pub from: String,
    /// Recipient address (None for contract creation)
    pub to: Option<String>,
    /// Calldata
    pub input: String,
    /// Value in wei (hex string)
    pub value: String,
}

impl EvmTransaction {
    /// Parses the transferred value.
    pub fn value_wei(&self) -> Result<u128> {
        parse_hex_u128(&self.value)
            .with_context(|| format!("Invalid transaction value '{}'", self.value))
    }
}

/// Subset of a transaction receipt used for finality checks
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EvmReceipt {
    /// Transaction status ("0x1" = success, "0x0" = failure)
    pub status: Option<String>,
    /// Block the transaction was included in
    #[serde(rename = "blockNumber")]
    pub block_number: Option<String>,
}

impl EvmReceipt {
    /// Whether execution succeeded. Pre-byzantium receipts without a status
    /// field are treated as successful.
    pub fn succeeded(&self) -> bool {
        self.status.as_deref().map(|s| s == "0x1").unwrap_or(true)
    }
}

/// Inclusion state of a transaction relative to the current chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InclusionState {
    /// No receipt yet (unknown or still in the mempool)
    Pending,
    /// Mined, but execution reverted
    Reverted { depth: u64 },
    /// Mined and successful
    Included { depth: u64 },
}

impl InclusionState {
    /// Confirmation depth (0 while pending).
    pub fn depth(&self) -> u64 {
        match self {
            InclusionState::Pending => 0,
            InclusionState::Reverted { depth } | InclusionState::Included { depth } => *depth,
        }
    }
}

// ============================================================================
// EVM CLIENT IMPLEMENTATION
// ============================================================================

/// Client for communicating with EVM-compatible blockchain nodes via JSON-RPC
#[derive(Clone)]
pub struct EvmClient {
    /// HTTP client for making requests
    client: Client,
    /// Base URL of the EVM node (e.g., "http://127.0.0.1:8545")
    base_url: String,
}

impl EvmClient {
    /// Creates a new EVM client for the given node URL
    ///
    /// # Arguments
    ///
    /// * `node_url` - Base URL of the EVM node
    ///
    /// # Returns
    ///
    /// * `Ok(EvmClient)` - Successfully created client
    /// * `Err(anyhow::Error)` - Failed to create client
    pub fn new(node_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: node_url.to_string(),
        })
    }

    /// Returns the base URL of this client
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends a JSON-RPC call and returns the (possibly null) result.
    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<Option<T>> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: 1,
        };

        debug!("EVM RPC {} -> {}", method, self.base_url);

        let response: JsonRpcResponse<T> = self
            .client
            .post(&self.base_url)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Failed to send {} request to {}", method, self.base_url))?
            .json()
            .await
            .with_context(|| {
                format!("Failed to parse {} response from {}", method, self.base_url)
            })?;

        if let Some(error) = response.error {
            return Err(anyhow::anyhow!(
                "JSON-RPC error from {}: {} (code: {})",
                self.base_url,
                error.message,
                error.code
            ));
        }

        Ok(response.result)
    }

    /// Sends a JSON-RPC call whose result must be present.
    async fn call_required<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<serde_json::Value>,
    ) -> Result<T> {
        self.call(method, params)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No result in {} response", method))
    }

    /// Queries transaction details by hash using eth_getTransactionByHash
    ///
    /// # Returns
    ///
    /// * `Ok(Some(EvmTransaction))` - Transaction information
    /// * `Ok(None)` - The node does not know the transaction
    /// * `Err(anyhow::Error)` - Failed to query transaction
    pub async fn get_transaction(&self, hash: &str) -> Result<Option<EvmTransaction>> {
        self.call(
            "eth_getTransactionByHash",
            vec![serde_json::json!(normalize_hash(hash))],
        )
        .await
    }

    /// Queries the transaction receipt by hash using eth_getTransactionReceipt
    pub async fn get_transaction_receipt(&self, hash: &str) -> Result<Option<EvmReceipt>> {
        self.call(
            "eth_getTransactionReceipt",
            vec![serde_json::json!(normalize_hash(hash))],
        )
        .await
    }

    /// Gets the current block number
    pub async fn get_block_number(&self) -> Result<u64> {
        let block_hex: String = self.call_required("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&block_hex).context("Failed to parse block number")
    }

    /// Gets the chain id reported by the node
    pub async fn get_chain_id(&self) -> Result<u64> {
        let chain_id_hex: String = self.call_required("eth_chainId", vec![]).await?;
        parse_hex_u64(&chain_id_hex).context("Failed to parse chain id")
    }

    /// Gets the pending nonce of an account
    pub async fn get_transaction_count(&self, address: &str) -> Result<u64> {
        let nonce_hex: String = self
            .call_required(
                "eth_getTransactionCount",
                vec![serde_json::json!(address), serde_json::json!("pending")],
            )
            .await?;
        parse_hex_u64(&nonce_hex).context("Failed to parse transaction count")
    }

    /// Gets the node's suggested gas price in wei
    pub async fn gas_price(&self) -> Result<u128> {
        let price_hex: String = self.call_required("eth_gasPrice", vec![]).await?;
        parse_hex_u128(&price_hex).context("Failed to parse gas price")
    }

    /// Estimates the gas needed for a call
    ///
    /// # Arguments
    ///
    /// * `from` - Sender address
    /// * `to` - Target address
    /// * `value` - Value in wei
    /// * `data` - Calldata
    pub async fn estimate_gas(
        &self,
        from: &str,
        to: &str,
        value: u128,
        data: &[u8],
    ) -> Result<u64> {
        let call = serde_json::json!({
            "from": from,
            "to": to,
            "value": format!("0x{:x}", value),
            "data": format!("0x{}", hex::encode(data)),
        });
        let gas_hex: String = self.call_required("eth_estimateGas", vec![call]).await?;
        parse_hex_u64(&gas_hex).context("Failed to parse gas estimate")
    }

    /// Broadcasts a signed raw transaction and returns its hash
    pub async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String> {
        self.call_required(
            "eth_sendRawTransaction",
            vec![serde_json::json!(format!("0x{}", hex::encode(raw)))],
        )
        .await
    }

    /// Determines how deep a transaction is buried under the chain head.
    ///
    /// Depth counts the inclusion block itself, so a transaction mined in the
    /// head block has depth 1.
    pub async fn inclusion_state(&self, hash: &str) -> Result<InclusionState> {
        let receipt = match self.get_transaction_receipt(hash).await? {
            Some(receipt) => receipt,
            None => return Ok(InclusionState::Pending),
        };

        let block = match receipt.block_number.as_deref() {
            Some(block) => parse_hex_u64(block).context("Failed to parse receipt block number")?,
            None => return Ok(InclusionState::Pending),
        };

        let head = self.get_block_number().await?;
        let depth = head.saturating_sub(block) + 1;

        if receipt.succeeded() {
            Ok(InclusionState::Included { depth })
        } else {
            Ok(InclusionState::Reverted { depth })
        }
    }
}

/// Ensures a transaction hash carries the 0x prefix
fn normalize_hash(hash: &str) -> String {
    if hash.starts_with("0x") {
        hash.to_string()
    } else {
        format!("0x{}", hash)
    }
}
