//! Ledger REST Client
//!
//! Reads state by address prefix (following pagination), submits batch
//! envelopes, and resolves batch status links.

use anyhow::{Context, Result};
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

// ============================================================================
// API RESPONSE STRUCTURES
// ============================================================================

/// Error envelope returned by the REST API
#[derive(Debug, Clone, Deserialize)]
struct ApiError {
    #[serde(default)]
    code: Option<i64>,
    message: String,
}

#[derive(Debug, Deserialize)]
struct Paging {
    next: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawStateEntry {
    address: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct StatePage {
    #[serde(default)]
    data: Option<Vec<RawStateEntry>>,
    #[serde(default)]
    paging: Option<Paging>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    link: Option<String>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct InvalidTransaction {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusRecord {
    id: String,
    status: String,
    #[serde(default)]
    invalid_transactions: Vec<InvalidTransaction>,
}

#[derive(Debug, Deserialize)]
struct StatusResponse {
    #[serde(default)]
    data: Option<Vec<StatusRecord>>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct BatchTransaction {
    header_signature: String,
}

#[derive(Debug, Deserialize)]
struct BatchRecord {
    #[serde(default)]
    transactions: Vec<BatchTransaction>,
}

#[derive(Debug, Deserialize)]
struct BatchesResponse {
    #[serde(default)]
    data: Option<Vec<BatchRecord>>,
}

/// A single record read from ledger state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    /// 70 hex character record address
    pub address: String,
    /// Raw record bytes
    pub data: Vec<u8>,
}

/// Commitment status of a submitted batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchStatus {
    /// Committed into a block. The transaction id is present when it was
    /// requested and the ledger could resolve it.
    Committed { transaction_id: Option<String> },
    /// Rejected by the transaction processor
    Invalid { message: String },
    /// Not final yet (pending or unknown to the validator)
    Pending,
}

// ============================================================================
// LEDGER CLIENT IMPLEMENTATION
// ============================================================================

/// Client for the ledger's REST API
#[derive(Clone)]
pub struct LedgerClient {
    client: Client,
    base_url: Url,
}

impl LedgerClient {
    /// Creates a new ledger client
    ///
    /// # Arguments
    ///
    /// * `rest_url` - Base URL of the REST API (e.g., "http://127.0.0.1:8008")
    ///
    /// # Returns
    ///
    /// * `Ok(LedgerClient)` - Successfully created client
    /// * `Err(anyhow::Error)` - Invalid URL or failed to create HTTP client
    pub fn new(rest_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .no_proxy()
            .build()
            .context("Failed to create HTTP client")?;
        let base_url =
            Url::parse(rest_url).with_context(|| format!("Invalid ledger URL '{}'", rest_url))?;

        Ok(Self { client, base_url })
    }

    /// Returns the base URL of this client
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid ledger path '{}'", path))
    }

    /// Reads every record whose address starts with `prefix`.
    ///
    /// Follows `paging.next` until the server stops returning one. If any
    /// page fails the whole query fails; partial results are never returned.
    pub async fn query_by_prefix(&self, prefix: &str) -> Result<Vec<StateEntry>> {
        let mut url = self.endpoint("state")?;
        url.query_pairs_mut().append_pair("address", prefix);

        let mut entries = Vec::new();
        let mut page = 1;
        loop {
            let state_page = self
                .fetch_state_page(&url)
                .await
                .with_context(|| {
                    format!("Failed to query state prefix {} (page {})", prefix, page)
                })?;

            for raw in state_page.data.unwrap_or_default() {
                let data = base64::engine::general_purpose::STANDARD
                    .decode(&raw.data)
                    .with_context(|| format!("Invalid base64 data at address {}", raw.address))?;
                entries.push(StateEntry {
                    address: raw.address,
                    data,
                });
            }

            match state_page.paging.and_then(|p| p.next) {
                Some(next) if !next.is_empty() => {
                    url = self
                        .base_url
                        .join(&next)
                        .with_context(|| format!("Invalid paging link '{}'", next))?;
                    page += 1;
                }
                _ => break,
            }
        }

        debug!("Read {} state entries under {}", entries.len(), prefix);
        Ok(entries)
    }

    async fn fetch_state_page(&self, url: &Url) -> Result<StatePage> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;
        let status = response.status();
        let page: StatePage = response
            .json()
            .await
            .with_context(|| format!("Failed to parse state response from {} ({})", url, status))?;

        if let Some(error) = page.error {
            return Err(api_error(&error));
        }
        if !status.is_success() {
            anyhow::bail!("Ledger returned HTTP {}", status);
        }
        Ok(page)
    }

    /// Reads the record stored at exactly `address`, if any.
    pub async fn get_state(&self, address: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .query_by_prefix(address)
            .await?
            .into_iter()
            .find(|entry| entry.address == address)
            .map(|entry| entry.data))
    }

    /// Posts a serialized batch list and returns the status link to poll.
    pub async fn submit_batch(&self, envelope: &[u8]) -> Result<String> {
        let url = self.endpoint("batches")?;
        let response = self
            .client
            .post(url.clone())
            .header("Content-Type", "application/octet-stream")
            .body(envelope.to_vec())
            .send()
            .await
            .with_context(|| format!("Failed to submit batch to {}", url))?;
        let status = response.status();
        let body: SubmitResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse batch submission response ({})", status))?;

        if let Some(error) = body.error {
            return Err(api_error(&error)).context("Ledger rejected batch submission");
        }
        body.link
            .filter(|link| !link.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("Batch submission response carried no link ({})", status)
            })
    }

    /// Polls a status link once.
    ///
    /// # Arguments
    ///
    /// * `link` - Link returned by `submit_batch`
    /// * `want_txid` - Look up the committed transaction id (best-effort)
    pub async fn resolve_link(&self, link: &str, want_txid: bool) -> Result<BatchStatus> {
        let url = self
            .base_url
            .join(link)
            .with_context(|| format!("Invalid status link '{}'", link))?;
        let response: StatusResponse = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to poll batch status at {}", url))?
            .json()
            .await
            .with_context(|| format!("Failed to parse batch status from {}", url))?;

        if let Some(error) = response.error {
            return Err(api_error(&error)).context("Ledger refused batch status query");
        }

        let record = response
            .data
            .and_then(|records| records.into_iter().next())
            .ok_or_else(|| anyhow::anyhow!("Batch status response from {} is empty", url))?;

        match record.status.as_str() {
            "INVALID" => {
                let message = record
                    .invalid_transactions
                    .into_iter()
                    .find_map(|tx| tx.message)
                    .unwrap_or_else(|| format!("Batch {} is invalid", record.id));
                Ok(BatchStatus::Invalid { message })
            }
            "COMMITTED" => {
                let transaction_id = if want_txid {
                    self.committed_transaction_id(&record.id).await
                } else {
                    None
                };
                Ok(BatchStatus::Committed { transaction_id })
            }
            _ => Ok(BatchStatus::Pending),
        }
    }

    async fn committed_transaction_id(&self, batch_id: &str) -> Option<String> {
        let lookup = async {
            let mut url = self.endpoint("batches")?;
            url.query_pairs_mut().append_pair("id", batch_id);
            let response: BatchesResponse = self.client.get(url).send().await?.json().await?;
            Ok::<_, anyhow::Error>(
                response
                    .data
                    .and_then(|batches| batches.into_iter().next())
                    .and_then(|batch| batch.transactions.into_iter().next())
                    .map(|tx| tx.header_signature),
            )
        };

        match lookup.await {
            Ok(id) => id,
            Err(e) => {
                warn!("Could not resolve transaction id of batch {}: {:#}", batch_id, e);
                None
            }
        }
    }
}

fn api_error(error: &ApiError) -> anyhow::Error {
    match error.code {
        Some(code) => anyhow::anyhow!("{} (code: {})", error.message, code),
        None => anyhow::anyhow!("{}", error.message),
    }
}
