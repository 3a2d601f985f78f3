//! Unit tests for configuration module

use std::io::Write;
use verifier::config::{ChainConfig, VerifierConfig};

/// What is tested: every chain kind parses with its defaults
/// Why: The `type` tag selects the verifier and omitted fields get defaults
#[test]
fn test_parse_all_chain_kinds_with_defaults() {
    let config = VerifierConfig::from_toml(
        r#"
[bridge]
listen_address = "0.0.0.0:7000"

[[chain]]
name = "btc"
type = "bitcoin"
rpc_url = "http://127.0.0.1:18443"
rpc_user = "user"
rpc_password = "pass"

[[chain]]
name = "eth"
type = "ethereum"
rpc_url = "http://127.0.0.1:8545"
confirmations = 12

[[chain]]
name = "usdc"
type = "erc20"
rpc_url = "http://127.0.0.1:8545"

[[chain]]
name = "usdc-gw"
type = "erc20_gateway"
rpc_url = "http://127.0.0.1:8545"
contract_address = "0x000000000000000000000000000000000000000e"
"#,
    )
    .unwrap();

    assert_eq!(config.bridge.listen_address, "0.0.0.0:7000");
    assert_eq!(config.chain.len(), 4);
    assert_eq!(config.chain[0].confirmations(), 1);
    assert_eq!(config.chain[1].confirmations(), 12);
    match &config.chain[2] {
        ChainConfig::Erc20(cfg) => assert_eq!(cfg.function_signature, "transfer(address,uint256)"),
        other => panic!("Expected erc20 chain, got {:?}", other),
    }
    match &config.chain[3] {
        ChainConfig::Erc20Gateway(cfg) => {
            assert_eq!(cfg.function_signature, "forward(address,address,uint256,bytes32)")
        }
        other => panic!("Expected gateway chain, got {:?}", other),
    }
}

/// What is tested: the bridge section is optional
#[test]
fn test_default_listen_address() {
    let config = VerifierConfig::from_toml("").unwrap();
    assert_eq!(config.bridge.listen_address, "127.0.0.1:5555");
    assert!(config.chain.is_empty());
}

/// What is tested: inconsistent chain tables are rejected
/// Why: Chain names key the registry; every verifier needs a node and a threshold
#[test]
fn test_validation_errors() {
    let eth = "[[chain]]\nname = \"eth\"\ntype = \"ethereum\"\nrpc_url = \"http://127.0.0.1:8545\"\n";

    let duplicate = VerifierConfig::from_toml(&format!("{}{}", eth, eth)).unwrap_err();
    assert!(duplicate.to_string().contains("more than once"));

    let empty_url =
        VerifierConfig::from_toml(&eth.replace("http://127.0.0.1:8545", "")).unwrap_err();
    assert!(empty_url.to_string().contains("empty rpc_url"));

    let zero = VerifierConfig::from_toml(&format!("{}confirmations = 0\n", eth)).unwrap_err();
    assert!(zero.to_string().contains("at least one confirmation"));

    let missing_gateway = VerifierConfig::from_toml(
        "[[chain]]\nname = \"gw\"\ntype = \"erc20_gateway\"\nrpc_url = \"http://127.0.0.1:8545\"\n",
    );
    assert!(missing_gateway.is_err());

    let short_gateway = VerifierConfig::from_toml(
        "[[chain]]\nname = \"gw\"\ntype = \"erc20_gateway\"\nrpc_url = \"http://127.0.0.1:8545\"\ncontract_address = \"0x1234\"\n",
    )
    .unwrap_err();
    assert!(short_gateway.to_string().contains("20-byte"));
}

/// What is tested: load_from_path() reads a file and reports a missing one
/// Why: The binary loads its configuration this way
#[test]
fn test_load_from_path() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"[bridge]\nlisten_address = \"127.0.0.1:6000\"\n").unwrap();
    let config = VerifierConfig::load_from_path(Some(file.path().to_str().unwrap())).unwrap();
    assert_eq!(config.bridge.listen_address, "127.0.0.1:6000");

    let err = VerifierConfig::load_from_path(Some("/nonexistent/verifier.toml")).unwrap_err();
    assert!(err.to_string().contains("verifier.template.toml"));
}
