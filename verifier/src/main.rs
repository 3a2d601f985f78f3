//! Payment Proof Verifier Service
//!
//! Loads the chain configuration, builds one verifier per chain and serves
//! verification requests on the bridge listener until Ctrl-C.

use anyhow::Result;
use tracing::info;

use verifier::bridge::{self, Bridge};
use verifier::{VerifierConfig, VerifierRegistry};

// ============================================================================
// MAIN APPLICATION ENTRY POINT
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    info!("Starting Payment Proof Verifier");

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        println!("Payment Proof Verifier");
        println!();
        println!("Usage: verifier [OPTIONS]");
        println!();
        println!("Options:");
        println!("  --config <path>   Use custom config file path");
        println!("  --help, -h        Show this help message");
        println!();
        println!("Environment variables:");
        println!("  VERIFIER_CONFIG_PATH    Path to config file (default: config/verifier.toml)");
        return Ok(());
    }

    let mut config_path = None;
    for (i, arg) in args.iter().enumerate() {
        if arg == "--config" && i + 1 < args.len() {
            config_path = Some(args[i + 1].clone());
            break;
        }
    }

    let config = VerifierConfig::load_from_path(config_path.as_deref())?;
    info!("Configuration loaded successfully");

    let registry = VerifierRegistry::from_config(&config)?;
    info!("Verifiers ready for chains: {}", registry.names().join(", "));

    let listener = bridge::bind(&config.bridge.listen_address).await?;
    info!("Bridge listening on {}", config.bridge.listen_address);

    Bridge::new(registry)
        .serve(listener, async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
}
