//! Wire envelope messages accepted by the ledger's `POST /batches` endpoint.
//!
//! Field numbers follow the ledger's published schema; unused fields are
//! omitted.

/// Signed header of a single transaction
#[derive(Clone, PartialEq, prost::Message)]
pub struct TransactionHeader {
    #[prost(string, tag = "1")]
    pub batcher_public_key: String,
    #[prost(string, repeated, tag = "2")]
    pub dependencies: Vec<String>,
    #[prost(string, tag = "3")]
    pub family_name: String,
    #[prost(string, tag = "4")]
    pub family_version: String,
    #[prost(string, repeated, tag = "5")]
    pub inputs: Vec<String>,
    #[prost(string, tag = "6")]
    pub nonce: String,
    #[prost(string, repeated, tag = "7")]
    pub outputs: Vec<String>,
    #[prost(string, tag = "9")]
    pub payload_sha512: String,
    #[prost(string, tag = "10")]
    pub signer_public_key: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Transaction {
    /// Serialized `TransactionHeader`
    #[prost(bytes = "vec", tag = "1")]
    pub header: Vec<u8>,
    /// Hex signature over `header`; doubles as the transaction id
    #[prost(string, tag = "2")]
    pub header_signature: String,
    #[prost(bytes = "vec", tag = "3")]
    pub payload: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BatchHeader {
    #[prost(string, tag = "1")]
    pub signer_public_key: String,
    #[prost(string, repeated, tag = "2")]
    pub transaction_ids: Vec<String>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Batch {
    /// Serialized `BatchHeader`
    #[prost(bytes = "vec", tag = "1")]
    pub header: Vec<u8>,
    /// Hex signature over `header`; doubles as the batch id
    #[prost(string, tag = "2")]
    pub header_signature: String,
    #[prost(message, repeated, tag = "3")]
    pub transactions: Vec<Transaction>,
    #[prost(bool, tag = "4")]
    pub trace: bool,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BatchList {
    #[prost(message, repeated, tag = "1")]
    pub batches: Vec<Batch>,
}
