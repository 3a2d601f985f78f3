//! Configuration Management Module
//!
//! Loads the settlement service configuration: ledger connection, progress
//! store location, and one `[[chain]]` entry per external chain.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Default confirmation threshold
fn default_confirmations() -> u64 {
    1
}

fn default_poll_attempts() -> u32 {
    1
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_address_type() -> String {
    "wpkh".to_string()
}

fn default_transfer_signature() -> String {
    "transfer(address,uint256)".to_string()
}

fn default_gateway_signature() -> String {
    "forward(address,address,uint256,bytes32)".to_string()
}

fn default_progress_directory() -> String {
    "data/progress".to_string()
}

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure for the settlement service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettlementConfig {
    /// Ledger REST connection and signing identity
    pub ledger: LedgerConfig,
    /// Where progress tokens are persisted
    #[serde(default)]
    pub progress: ProgressConfig,
    /// External chains (use [[chain]] in TOML)
    #[serde(default)]
    pub chain: Vec<ChainConfig>,
}

/// Ledger connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// REST API base URL (e.g., "http://127.0.0.1:8008")
    pub rest_url: String,
    /// Environment variable name containing the ledger signing key (hex)
    pub private_key_env: String,
}

/// Progress store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressConfig {
    /// Base directory; tokens live at `<directory>/<chain>/<id>.token`
    #[serde(default = "default_progress_directory")]
    pub directory: String,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            directory: default_progress_directory(),
        }
    }
}

/// Configuration for one external chain. The `type` field selects the kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChainConfig {
    /// Native-coin UTXO chain
    #[serde(rename = "bitcoin")]
    Bitcoin(BitcoinChainConfig),
    /// Account-based chain, value transfer
    #[serde(rename = "ethereum")]
    Ethereum(EthereumChainConfig),
    /// Token contract, direct transfer call
    #[serde(rename = "erc20")]
    Erc20(TokenChainConfig),
    /// Token contract paid through a gateway contract (approve, then forward)
    #[serde(rename = "erc20_gateway")]
    Erc20Gateway(GatewayChainConfig),
}

/// Settings shared by every chain kind.
pub struct PollSettings {
    pub confirmations: u64,
    pub attempts: u32,
    pub interval_ms: u64,
}

impl ChainConfig {
    /// Configured chain name (registry key)
    pub fn name(&self) -> &str {
        match self {
            ChainConfig::Bitcoin(cfg) => &cfg.name,
            ChainConfig::Ethereum(cfg) => &cfg.name,
            ChainConfig::Erc20(cfg) => &cfg.name,
            ChainConfig::Erc20Gateway(cfg) => &cfg.name,
        }
    }

    /// Chain type tag; address records must carry the same tag
    pub fn chain_type(&self) -> &'static str {
        match self {
            ChainConfig::Bitcoin(_) => "bitcoin",
            ChainConfig::Ethereum(_) => "ethereum",
            ChainConfig::Erc20(_) => "erc20",
            ChainConfig::Erc20Gateway(_) => "erc20_gateway",
        }
    }

    pub fn rpc_url(&self) -> &str {
        match self {
            ChainConfig::Bitcoin(cfg) => &cfg.rpc_url,
            ChainConfig::Ethereum(cfg) => &cfg.rpc_url,
            ChainConfig::Erc20(cfg) => &cfg.rpc_url,
            ChainConfig::Erc20Gateway(cfg) => &cfg.rpc_url,
        }
    }

    /// Network tag both parties' addresses must carry, if pinned
    pub fn network(&self) -> Option<&str> {
        match self {
            ChainConfig::Bitcoin(cfg) => cfg.network.as_deref(),
            ChainConfig::Ethereum(cfg) => cfg.network.as_deref(),
            ChainConfig::Erc20(cfg) => cfg.network.as_deref(),
            ChainConfig::Erc20Gateway(cfg) => cfg.network.as_deref(),
        }
    }

    pub fn poll_settings(&self) -> PollSettings {
        let (confirmations, attempts, interval_ms) = match self {
            ChainConfig::Bitcoin(cfg) => {
                (cfg.confirmations, cfg.poll_attempts, cfg.poll_interval_ms)
            }
            ChainConfig::Ethereum(cfg) => {
                (cfg.confirmations, cfg.poll_attempts, cfg.poll_interval_ms)
            }
            ChainConfig::Erc20(cfg) => (cfg.confirmations, cfg.poll_attempts, cfg.poll_interval_ms),
            ChainConfig::Erc20Gateway(cfg) => {
                (cfg.confirmations, cfg.poll_attempts, cfg.poll_interval_ms)
            }
        };
        PollSettings {
            confirmations,
            attempts,
            interval_ms,
        }
    }
}

/// Configuration for a Bitcoin Core backed chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinChainConfig {
    /// Registry key
    pub name: String,
    /// bitcoind RPC endpoint
    pub rpc_url: String,
    #[serde(default)]
    pub rpc_user: Option<String>,
    #[serde(default)]
    pub rpc_password: Option<String>,
    /// Environment variable name containing the payer's WIF key
    pub secret_key_env: String,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Flat fee in satoshis
    #[serde(default)]
    pub fee: Option<u64>,
    /// Output script kind of the payer's key ("wpkh" or "pkh")
    #[serde(default = "default_address_type")]
    pub address_type: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Configuration for an account-based chain paid in its native currency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthereumChainConfig {
    pub name: String,
    pub rpc_url: String,
    /// Environment variable name containing the payer's private key (hex)
    pub secret_key_env: String,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Gas price override in wei; the node's suggestion is used when absent
    #[serde(default)]
    pub gas_price: Option<u64>,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Configuration for a token contract paid with a direct transfer call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenChainConfig {
    pub name: String,
    pub rpc_url: String,
    pub secret_key_env: String,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default)]
    pub gas_price: Option<u64>,
    /// Token contract; address records must use it as their prefix
    #[serde(default)]
    pub contract_address: Option<String>,
    /// Transfer function; the proof is appended after its arguments
    #[serde(default = "default_transfer_signature")]
    pub function_signature: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Configuration for a token paid through a gateway contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayChainConfig {
    pub name: String,
    pub rpc_url: String,
    pub secret_key_env: String,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    #[serde(default)]
    pub gas_price: Option<u64>,
    /// Gateway contract the payer approves and then calls
    #[serde(default)]
    pub contract_address: Option<String>,
    /// Gateway function taking `(token, destination, amount, proof)`
    #[serde(default = "default_gateway_signature")]
    pub function_signature: String,
    #[serde(default)]
    pub network: Option<String>,
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl SettlementConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to config file. If None, uses SETTLEMENT_CONFIG_PATH env var or default.
    ///
    /// # Returns
    ///
    /// * `Ok(SettlementConfig)` - Successfully loaded and validated configuration
    /// * `Err(anyhow::Error)` - File missing, unparsable, or invalid
    pub fn load_from_path(path: Option<&str>) -> anyhow::Result<Self> {
        let config_path = path
            .map(|p| p.to_string())
            .or_else(|| std::env::var("SETTLEMENT_CONFIG_PATH").ok())
            .unwrap_or_else(|| "config/settlement.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let config = Self::from_toml(&content)?;
            Ok(config)
        } else {
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/settlement.template.toml config/settlement.toml\n\
                Then edit config/settlement.toml with your actual values.",
                config_path
            ))
        }
    }

    /// Loads configuration using the default path resolution.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_path(None)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: SettlementConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Looks up a chain by its configured name.
    pub fn chain(&self, name: &str) -> Option<&ChainConfig> {
        self.chain.iter().find(|c| c.name() == name)
    }

    /// Validates the configuration for consistency.
    ///
    /// Checks:
    /// - Ledger URL and key variable are set
    /// - Chain names are unique
    /// - Every chain has an RPC URL, a non-zero confirmation threshold and at least one poll attempt
    /// - Per-kind fields: bitcoin fee and address type, token contract addresses
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.ledger.rest_url.trim().is_empty() {
            anyhow::bail!("Configuration error: ledger.rest_url must not be empty");
        }
        if self.ledger.private_key_env.trim().is_empty() {
            anyhow::bail!("Configuration error: ledger.private_key_env must not be empty");
        }

        let mut names = HashSet::new();
        for chain in &self.chain {
            if !names.insert(chain.name()) {
                anyhow::bail!(
                    "Configuration error: chain name '{}' is configured more than once",
                    chain.name()
                );
            }
            if chain.rpc_url().trim().is_empty() {
                anyhow::bail!("Configuration error: chain '{}' has an empty rpc_url", chain.name());
            }
            let poll = chain.poll_settings();
            if poll.confirmations == 0 {
                anyhow::bail!(
                    "Configuration error: chain '{}' must require at least one confirmation",
                    chain.name()
                );
            }
            if poll.attempts == 0 {
                anyhow::bail!(
                    "Configuration error: chain '{}' must poll at least once",
                    chain.name()
                );
            }

            match chain {
                ChainConfig::Bitcoin(cfg) => {
                    if cfg.fee.is_none() {
                        anyhow::bail!(
                            "Configuration error: bitcoin chain '{}' has no fee",
                            cfg.name
                        );
                    }
                    if cfg.address_type != "wpkh" && cfg.address_type != "pkh" {
                        anyhow::bail!(
                            "Configuration error: chain '{}' has unsupported address_type '{}' (expected wpkh or pkh)",
                            cfg.name,
                            cfg.address_type
                        );
                    }
                }
                ChainConfig::Ethereum(_) => {}
                ChainConfig::Erc20(cfg) => {
                    validate_contract(&cfg.name, cfg.contract_address.as_deref())?;
                }
                ChainConfig::Erc20Gateway(cfg) => {
                    validate_contract(&cfg.name, cfg.contract_address.as_deref())?;
                }
            }
        }

        Ok(())
    }
}

/// Validates a `0x`-prefixed 20-byte contract address.
fn validate_contract(chain: &str, contract: Option<&str>) -> anyhow::Result<()> {
    let contract = contract.ok_or_else(|| {
        anyhow::anyhow!("Configuration error: chain '{}' has no contract_address", chain)
    })?;
    let stripped = contract.strip_prefix("0x").ok_or_else(|| {
        anyhow::anyhow!(
            "Configuration error: contract_address of chain '{}' must be 0x-prefixed hex",
            chain
        )
    })?;
    let bytes = hex::decode(stripped).map_err(|_| {
        anyhow::anyhow!("Configuration error: contract_address of chain '{}' is not hex", chain)
    })?;
    if bytes.len() != 20 {
        anyhow::bail!(
            "Configuration error: contract_address of chain '{}' must be 20 bytes, got {}",
            chain,
            bytes.len()
        );
    }
    Ok(())
}
