//! Ledger Transaction Encoder
//!
//! Turns an ordered command `[verb, param1, ...]` into a signed batch
//! envelope for `POST /batches`:
//!
//! - payload: CBOR map `{ "v": verb, "p1": param1, "p2": param2, ... }`
//! - transaction header: signer/batcher key, family name/version, the family
//!   namespace as the only input and output, a nonce derived from the payload
//!   hash, and the SHA-512 of the payload
//! - both headers signed with secp256k1 ECDSA over SHA-256 (compact hex)
//!
//! Encoding is deterministic: the same command and key always produce the
//! same batch id, so resubmitting after a crash is harmless.

use anyhow::{Context, Result};
use ciborium::value::Value;
use k256::ecdsa::signature::Signer;
use k256::ecdsa::{Signature, SigningKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use prost::Message;
use sha2::{Digest, Sha256, Sha512};

use crate::protos::{Batch, BatchHeader, BatchList, Transaction, TransactionHeader};

/// Transaction family handled by the ledger's processor
pub const FAMILY_NAME: &str = "p2plending";
/// Transaction family version
pub const FAMILY_VERSION: &str = "1.0";

/// Number of hex characters kept from the public key digest
const SIGHASH_LEN: usize = 60;

// ============================================================================
// ADDRESSING AND FINGERPRINTS
// ============================================================================

/// Six hex character prefix shared by every record of the family
pub fn namespace() -> String {
    let digest = hex::encode(Sha512::digest(FAMILY_NAME.as_bytes()));
    digest[..6].to_string()
}

/// Computes the owner fingerprint ("sighash") of a secp256k1 public key.
///
/// The key is compressed if needed, hex-encoded, and the hex text is hashed
/// with SHA-512; the fingerprint is the last 60 hex characters of the digest.
///
/// # Arguments
///
/// * `public_key` - 65-byte uncompressed (0x04 || X || Y) or 33-byte compressed key
///
/// # Returns
///
/// * `Ok(String)` - Lowercase 60-character fingerprint
/// * `Err(anyhow::Error)` - The bytes are not a SEC1 encoded key
pub fn sighash(public_key: &[u8]) -> Result<String> {
    let compressed = compress_public_key(public_key)?;
    let digest = hex::encode(Sha512::digest(hex::encode(compressed).as_bytes()));
    Ok(digest[digest.len() - SIGHASH_LEN..].to_lowercase())
}

fn compress_public_key(public_key: &[u8]) -> Result<Vec<u8>> {
    match public_key {
        [0x04, rest @ ..] if rest.len() == 64 => {
            let (x, y) = rest.split_at(32);
            let prefix = if y[31] & 1 == 0 { 0x02 } else { 0x03 };
            let mut compressed = Vec::with_capacity(33);
            compressed.push(prefix);
            compressed.extend_from_slice(x);
            Ok(compressed)
        }
        [0x02 | 0x03, rest @ ..] if rest.len() == 32 => Ok(public_key.to_vec()),
        _ => anyhow::bail!(
            "Public key must be 65 bytes uncompressed or 33 bytes compressed, got {} bytes",
            public_key.len()
        ),
    }
}

// ============================================================================
// SIGNING IDENTITY
// ============================================================================

/// secp256k1 identity used to sign ledger transactions and batches
#[derive(Clone)]
pub struct LedgerSigner {
    signing_key: SigningKey,
}

impl std::fmt::Debug for LedgerSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerSigner")
            .field("public_key", &self.public_key_hex())
            .finish()
    }
}

impl LedgerSigner {
    /// Creates a signer from a hex-encoded 32-byte private key.
    pub fn from_hex(secret: &str) -> Result<Self> {
        let secret = secret.trim();
        let bytes = hex::decode(secret.strip_prefix("0x").unwrap_or(secret))
            .context("Ledger private key is not valid hex")?;
        let signing_key = SigningKey::from_slice(&bytes)
            .map_err(|e| anyhow::anyhow!("Invalid ledger private key: {}", e))?;
        Ok(Self { signing_key })
    }

    /// Compressed public key, lowercase hex
    pub fn public_key_hex(&self) -> String {
        let point = self.signing_key.verifying_key().to_encoded_point(true);
        hex::encode(point.as_bytes())
    }

    /// Owner fingerprint of this identity
    pub fn sighash(&self) -> Result<String> {
        let point = self.signing_key.verifying_key().to_encoded_point(false);
        sighash(point.as_bytes())
    }

    /// Signs `data` (hashed with SHA-256) and returns the 64-byte compact signature as hex.
    pub fn sign(&self, data: &[u8]) -> String {
        let signature: Signature = self.signing_key.sign(data);
        hex::encode(signature.to_bytes())
    }
}

// ============================================================================
// PAYLOAD
// ============================================================================

/// Encodes `[verb, p1, p2, ...]` as the CBOR payload map.
pub fn encode_payload(command: &[String]) -> Result<Vec<u8>> {
    let (verb, params) = command
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("Cannot encode an empty command"))?;

    let mut entries = Vec::with_capacity(command.len());
    entries.push((Value::Text("v".to_string()), Value::Text(verb.clone())));
    for (index, param) in params.iter().enumerate() {
        entries.push((
            Value::Text(format!("p{}", index + 1)),
            Value::Text(param.clone()),
        ));
    }

    let mut bytes = Vec::new();
    ciborium::ser::into_writer(&Value::Map(entries), &mut bytes)
        .map_err(|e| anyhow::anyhow!("Failed to encode command payload: {}", e))?;
    Ok(bytes)
}

/// Decodes a CBOR payload map back into `[verb, p1, p2, ...]`.
pub fn decode_payload(bytes: &[u8]) -> Result<Vec<String>> {
    let value: Value = ciborium::de::from_reader(bytes)
        .map_err(|e| anyhow::anyhow!("Payload is not valid CBOR: {}", e))?;
    let entries = match value {
        Value::Map(entries) => entries,
        _ => anyhow::bail!("Payload is not a CBOR map"),
    };

    let lookup = |key: &str| -> Option<String> {
        entries.iter().find_map(|(k, v)| match (k, v) {
            (Value::Text(k), Value::Text(v)) if k == key => Some(v.clone()),
            _ => None,
        })
    };

    let mut command = vec![lookup("v").ok_or_else(|| anyhow::anyhow!("Payload has no verb"))?];
    let mut index = 1;
    while let Some(param) = lookup(&format!("p{}", index)) {
        command.push(param);
        index += 1;
    }
    Ok(command)
}

// ============================================================================
// ENVELOPE
// ============================================================================

/// A signed batch ready for submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBatch {
    /// Serialized `BatchList`
    pub bytes: Vec<u8>,
    /// Batch header signature (the id the ledger reports status for)
    pub batch_id: String,
    /// Transaction header signature
    pub transaction_id: String,
}

/// Builds signed single-transaction batches
#[derive(Debug, Clone)]
pub struct TransactionEncoder {
    signer: LedgerSigner,
}

impl TransactionEncoder {
    pub fn new(signer: LedgerSigner) -> Self {
        Self { signer }
    }

    pub fn signer(&self) -> &LedgerSigner {
        &self.signer
    }

    /// Encodes a command into a signed `BatchList` with one batch and one transaction.
    ///
    /// # Arguments
    ///
    /// * `command` - `[verb, param1, ...]`; must not be empty
    ///
    /// # Returns
    ///
    /// * `Ok(EncodedBatch)` - Envelope bytes plus batch and transaction ids
    /// * `Err(anyhow::Error)` - The command was empty
    pub fn encode(&self, command: &[String]) -> Result<EncodedBatch> {
        let payload = encode_payload(command)?;
        let public_key = self.signer.public_key_hex();
        let ns = namespace();

        let header = TransactionHeader {
            batcher_public_key: public_key.clone(),
            dependencies: vec![],
            family_name: FAMILY_NAME.to_string(),
            family_version: FAMILY_VERSION.to_string(),
            inputs: vec![ns.clone()],
            nonce: hex::encode(Sha256::digest(&payload)),
            outputs: vec![ns],
            payload_sha512: hex::encode(Sha512::digest(&payload)),
            signer_public_key: public_key.clone(),
        }
        .encode_to_vec();
        let transaction_id = self.signer.sign(&header);

        let batch_header = BatchHeader {
            signer_public_key: public_key,
            transaction_ids: vec![transaction_id.clone()],
        }
        .encode_to_vec();
        let batch_id = self.signer.sign(&batch_header);

        let batch_list = BatchList {
            batches: vec![Batch {
                header: batch_header,
                header_signature: batch_id.clone(),
                transactions: vec![Transaction {
                    header,
                    header_signature: transaction_id.clone(),
                    payload,
                }],
                trace: false,
            }],
        };

        Ok(EncodedBatch {
            bytes: batch_list.encode_to_vec(),
            batch_id,
            transaction_id,
        })
    }
}

/// Extracts every command carried by a serialized `BatchList`.
pub fn decode_batch_list(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let batch_list = BatchList::decode(bytes).context("Envelope is not a valid batch list")?;
    batch_list
        .batches
        .iter()
        .flat_map(|batch| batch.transactions.iter())
        .map(|tx| decode_payload(&tx.payload))
        .collect()
}
