//! Configuration Management Module
//!
//! Loads the verifier configuration: the bridge listen address and one
//! `[[chain]]` entry per external chain the verifier can check payments on.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_confirmations() -> u64 {
    1
}

fn default_listen_address() -> String {
    "127.0.0.1:5555".to_string()
}

fn default_transfer_signature() -> String {
    "transfer(address,uint256)".to_string()
}

fn default_gateway_signature() -> String {
    "forward(address,address,uint256,bytes32)".to_string()
}

// ============================================================================
// CONFIGURATION STRUCTURES
// ============================================================================

/// Main configuration structure for the verifier service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifierConfig {
    /// Bridge front door settings
    #[serde(default)]
    pub bridge: BridgeConfig,
    /// External chains (use [[chain]] in TOML)
    #[serde(default)]
    pub chain: Vec<ChainConfig>,
}

/// Bridge listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Address the TCP listener binds to (e.g., "127.0.0.1:5555")
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
        }
    }
}

/// Configuration for one external chain. The `type` field selects the verifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ChainConfig {
    #[serde(rename = "bitcoin")]
    Bitcoin(BitcoinChainConfig),
    #[serde(rename = "ethereum")]
    Ethereum(EthereumChainConfig),
    #[serde(rename = "erc20")]
    Erc20(TokenChainConfig),
    #[serde(rename = "erc20_gateway")]
    Erc20Gateway(GatewayChainConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitcoinChainConfig {
    pub name: String,
    pub rpc_url: String,
    #[serde(default)]
    pub rpc_user: Option<String>,
    #[serde(default)]
    pub rpc_password: Option<String>,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EthereumChainConfig {
    pub name: String,
    pub rpc_url: String,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenChainConfig {
    pub name: String,
    pub rpc_url: String,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Token function taking `(destination, amount)`
    #[serde(default = "default_transfer_signature")]
    pub function_signature: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayChainConfig {
    pub name: String,
    pub rpc_url: String,
    #[serde(default = "default_confirmations")]
    pub confirmations: u64,
    /// Gateway contract the payment must be sent to
    pub contract_address: String,
    /// Gateway function taking `(token, destination, amount, proof)`
    #[serde(default = "default_gateway_signature")]
    pub function_signature: String,
}

impl ChainConfig {
    pub fn name(&self) -> &str {
        match self {
            ChainConfig::Bitcoin(cfg) => &cfg.name,
            ChainConfig::Ethereum(cfg) => &cfg.name,
            ChainConfig::Erc20(cfg) => &cfg.name,
            ChainConfig::Erc20Gateway(cfg) => &cfg.name,
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

    pub fn confirmations(&self) -> u64 {
        match self {
            ChainConfig::Bitcoin(cfg) => cfg.confirmations,
            ChainConfig::Ethereum(cfg) => cfg.confirmations,
            ChainConfig::Erc20(cfg) => cfg.confirmations,
            ChainConfig::Erc20Gateway(cfg) => cfg.confirmations,
        }
    }
}

// ============================================================================
// CONFIGURATION LOADING AND MANAGEMENT
// ============================================================================

impl VerifierConfig {
    /// Loads configuration from the TOML file.
    ///
    /// # Arguments
    ///
    /// * `path` - Optional path to config file. If None, uses VERIFIER_CONFIG_PATH env var or default.
    ///
    /// # Returns
    ///
    /// - `Ok(VerifierConfig)` - Successfully loaded configuration
    /// - `Err(anyhow::Error)` - Failed to load configuration or file doesn't exist
    pub fn load_from_path(path: Option<&str>) -> anyhow::Result<Self> {
        let config_path = path
            .map(|p| p.to_string())
            .or_else(|| std::env::var("VERIFIER_CONFIG_PATH").ok())
            .unwrap_or_else(|| "config/verifier.toml".to_string());

        if std::path::Path::new(&config_path).exists() {
            let content = std::fs::read_to_string(&config_path)?;
            Self::from_toml(&content)
        } else {
            Err(anyhow::anyhow!(
                "Configuration file '{}' not found. Please copy the template:\n\
                cp config/verifier.template.toml config/verifier.toml\n\
                Then edit config/verifier.toml with your actual values.",
                config_path
            ))
        }
    }

    pub fn load() -> anyhow::Result<Self> {
        Self::load_from_path(None)
    }

    /// Parses and validates a TOML document.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let config: VerifierConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration for consistency.
    ///
    /// Checks:
    /// - Chain names are unique
    /// - Every chain has an RPC URL and a non-zero confirmation threshold
    /// - The gateway contract is a 20-byte hex address
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bridge.listen_address.trim().is_empty() {
            anyhow::bail!("Configuration error: bridge.listen_address must not be empty");
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
            if chain.confirmations() == 0 {
                anyhow::bail!(
                    "Configuration error: chain '{}' must require at least one confirmation",
                    chain.name()
                );
            }
            if let ChainConfig::Erc20Gateway(cfg) = chain {
                if chain_clients_evm::parse_address(&cfg.contract_address).is_err() {
                    anyhow::bail!(
                        "Configuration error: contract_address of chain '{}' is not a 20-byte hex address",
                        cfg.name
                    );
                }
            }
        }
        Ok(())
    }
}
