//! Ledger records and the order/address resolver
//!
//! Records live at `namespace + tag + sha512(id)[..62]` and are stored as
//! CBOR maps with camelCase keys.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

use crate::client::LedgerClient;
use crate::encoder::namespace;

// ============================================================================
// ADDRESSING
// ============================================================================

/// Record type tags (two hex characters following the namespace)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordType {
    Order,
    Address,
    Transfer,
}

impl RecordType {
    pub fn tag(&self) -> &'static str {
        match self {
            RecordType::Order => "00",
            RecordType::Address => "01",
            RecordType::Transfer => "02",
        }
    }

    /// Address prefix shared by every record of this type
    pub fn prefix(&self) -> String {
        format!("{}{}", namespace(), self.tag())
    }
}

/// Computes the 70 hex character state address of a record.
pub fn record_address(record_type: RecordType, id: &str) -> String {
    let digest = hex::encode(Sha512::digest(id.as_bytes()));
    format!("{}{}", record_type.prefix(), &digest[..62])
}

// ============================================================================
// RECORDS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderKind {
    Ask,
    Bid,
    Deal,
    Repayment,
}

/// A loan order. Only the linking fields change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: OrderKind,
    pub amount: u64,
    pub interest: u64,
    pub maturity: u64,
    pub fee: u64,
    pub expiration: u64,
    /// Address record id of the paying side
    pub src_address: String,
    /// Address record id of the receiving side (absent on open asks)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_address: Option<String>,
    pub block_height: u64,
    /// Owner fingerprint
    pub owner: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loan_transfer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repayment_transfer: Option<String>,
}

/// An external-chain address registered on the ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressRecord {
    pub id: String,
    /// Chain tag, e.g. "bitcoin" or "erc20"
    pub blockchain: String,
    /// Plain address, or `contract@wallet` on token chains
    pub value: String,
    pub network: String,
    pub owner: String,
}

/// A registered external payment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    pub id: String,
    pub blockchain: String,
    pub src_address: String,
    pub dst_address: String,
    /// Id of the order this payment settles
    pub order: String,
    pub amount: u64,
    pub tx_id: String,
    pub block: u64,
    #[serde(default)]
    pub processed: bool,
    pub owner: String,
}

/// Decodes a CBOR record.
pub fn decode_record<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| anyhow::anyhow!("Invalid ledger record: {}", e))
}

/// Encodes a record as CBOR.
pub fn encode_record<T: Serialize>(record: &T) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(record, &mut bytes)
        .map_err(|e| anyhow::anyhow!("Failed to encode ledger record: {}", e))?;
    Ok(bytes)
}

/// Returns true when a bid can be matched against an ask.
///
/// Amounts must be equal, the ask's interest rate per unit of maturity must
/// not exceed the bid's, and the ask's fee must not exceed the bid's.
pub fn orders_match(ask: &Order, bid: &Order) -> bool {
    if ask.amount != bid.amount || ask.fee > bid.fee {
        return false;
    }
    if ask.maturity == 0 || bid.maturity == 0 {
        return false;
    }
    // ask.interest / ask.maturity <= bid.interest / bid.maturity
    (ask.interest as u128) * (bid.maturity as u128)
        <= (bid.interest as u128) * (ask.maturity as u128)
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Looks up orders, addresses and transfers by id
#[derive(Clone)]
pub struct OrderResolver {
    client: LedgerClient,
}

impl OrderResolver {
    pub fn new(client: LedgerClient) -> Self {
        Self { client }
    }

    /// Reads and decodes one record; `Ok(None)` if nothing is stored at its address.
    async fn fetch<T: DeserializeOwned>(
        &self,
        record_type: RecordType,
        id: &str,
    ) -> Result<Option<T>> {
        let address = record_address(record_type, id);
        let bytes = match self
            .client
            .get_state(&address)
            .await
            .with_context(|| format!("Failed to read {:?} {}", record_type, id))?
        {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        decode_record(&bytes)
            .map(Some)
            .with_context(|| format!("Failed to decode {:?} {}", record_type, id))
    }

    pub async fn order(&self, id: &str) -> Result<Option<Order>> {
        self.fetch(RecordType::Order, id).await
    }

    pub async fn address(&self, id: &str) -> Result<Option<AddressRecord>> {
        self.fetch(RecordType::Address, id).await
    }

    pub async fn transfer(&self, id: &str) -> Result<Option<Transfer>> {
        self.fetch(RecordType::Transfer, id).await
    }

    /// Lists every order on the ledger.
    pub async fn orders(&self) -> Result<Vec<Order>> {
        self.client
            .query_by_prefix(&RecordType::Order.prefix())
            .await?
            .iter()
            .map(|entry| {
                decode_record(&entry.data)
                    .with_context(|| format!("Failed to decode order at {}", entry.address))
            })
            .collect()
    }
}
