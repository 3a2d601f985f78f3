//! Key and amount helpers for the native-coin chain

use anyhow::{Context, Result};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};

/// Satoshis per coin
pub const SATS_PER_COIN: u64 = 100_000_000;

/// Outputs below this value are not relayed by default policy
pub const DUST_LIMIT_SATS: u64 = 546;

/// A decoded wallet-import-format private key
#[derive(Clone)]
pub struct WifKey {
    secret: [u8; 32],
    /// Whether the key maps to a compressed public key
    pub compressed: bool,
    /// Version byte (0x80 mainnet, 0xef test networks)
    pub version: u8,
}

impl std::fmt::Debug for WifKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WifKey")
            .field("compressed", &self.compressed)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

impl WifKey {
    /// Decodes and checksums a WIF string.
    pub fn decode(wif: &str) -> Result<Self> {
        let raw = bs58::decode(wif.trim())
            .into_vec()
            .context("Private key is not valid base58")?;
        if raw.len() < 5 {
            anyhow::bail!("Private key is too short");
        }

        let (payload, checksum) = raw.split_at(raw.len() - 4);
        if double_sha256(payload)[..4] != *checksum {
            anyhow::bail!("Private key checksum mismatch");
        }

        let (compressed, key_bytes) = match payload.len() {
            34 if payload[33] == 0x01 => (true, &payload[1..33]),
            33 => (false, &payload[1..33]),
            other => anyhow::bail!("Unexpected private key payload length {}", other),
        };

        let mut secret = [0u8; 32];
        secret.copy_from_slice(key_bytes);
        Ok(Self {
            secret,
            compressed,
            version: payload[0],
        })
    }

    /// Hex-encoded public key in the encoding the WIF flag selects.
    pub fn public_key_hex(&self) -> Result<String> {
        let signing_key = SigningKey::from_slice(&self.secret)
            .map_err(|e| anyhow::anyhow!("Invalid private key: {}", e))?;
        let point = signing_key.verifying_key().to_encoded_point(self.compressed);
        Ok(hex::encode(point.as_bytes()))
    }
}

/// Bitcoin's double SHA-256
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

/// Converts a coin amount reported by the node into satoshis.
pub fn coins_to_sats(amount: f64) -> Result<u64> {
    if !amount.is_finite() || amount < 0.0 {
        anyhow::bail!("Invalid coin amount {}", amount);
    }
    let sats = (amount * SATS_PER_COIN as f64).round();
    if sats > u64::MAX as f64 {
        anyhow::bail!("Coin amount {} overflows", amount);
    }
    Ok(sats as u64)
}

/// Formats satoshis as a fixed 8-decimal coin string accepted by the RPC.
pub fn sats_to_coin_string(sats: u64) -> String {
    format!("{}.{:08}", sats / SATS_PER_COIN, sats % SATS_PER_COIN)
}

/// Extracts the pushed bytes of an `OP_RETURN <data>` output script.
pub fn op_return_payload(script_hex: &str) -> Option<Vec<u8>> {
    let script = hex::decode(script_hex).ok()?;
    if script.first() != Some(&0x6a) {
        return None;
    }
    let (len, start) = match *script.get(1)? {
        n @ 0x01..=0x4b => (n as usize, 2),
        0x4c => (*script.get(2)? as usize, 3),
        _ => return None,
    };
    let data = script.get(start..start + len)?;
    if start + len != script.len() {
        return None;
    }
    Some(data.to_vec())
}
