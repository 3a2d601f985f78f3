//! Shared test helpers for verifier tests
//!
//! Constants, node mocks for both chain families, and request/config builders.

#![allow(dead_code)]

use serde_json::json;
use verifier::{ProofVerifier, VerificationRequest, VerifierConfig, VerifierRegistry};
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// CONSTANTS
// ============================================================================

// ------------------------------ ADDRESSES -------------------------------

pub const DUMMY_PAYER_EVM: &str = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";
pub const DUMMY_PAYEE_EVM: &str = "0x2b5ad5c4795c026514f8317c7a215e218dccd6cf";
pub const DUMMY_OTHER_EVM: &str = "0x00000000000000000000000000000000000000ff";

/// Token contract (EVM format, 40 hex characters)
pub const DUMMY_TOKEN_ADDR_EVM: &str = "0x000000000000000000000000000000000000000a";

/// Gateway contract (EVM format, 40 hex characters)
pub const DUMMY_GATEWAY_ADDR_EVM: &str = "0x000000000000000000000000000000000000000e";

pub const DUMMY_PAYER_BTC: &str = "bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080";
pub const DUMMY_PAYEE_BTC: &str = "bcrt1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qzf6z2f";
pub const DUMMY_OTHER_BTC: &str = "bcrt1q9vza2e8x573nczrlzms0wvx3gsqjx7vaxwd45v";

// -------------------------------- VALUES --------------------------------

/// sha256("order-1")
pub const DUMMY_PROOF: &str = "0bafe22156d2698c143b86040446d366ead863ba600d5c924f3d15c786ef4057";
pub const DUMMY_OTHER_PROOF: &str =
    "1111111111111111111111111111111111111111111111111111111111111111";

pub const DUMMY_AMOUNT: u64 = 1000;

/// Transaction hashes (EVM format, 64 hex characters)
pub const DUMMY_TX_HASH: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000010";

pub const DUMMY_BTC_TXID: &str =
    "2222222222222222222222222222222222222222222222222222222222222222";
pub const DUMMY_BTC_PREV_TXID: &str =
    "3333333333333333333333333333333333333333333333333333333333333333";

pub const DUMMY_EVM_NETWORK: &str = "1";
pub const DUMMY_BTC_NETWORK: &str = "regtest";

// ============================================================================
// EVM NODE
// ============================================================================

/// Answers a JSON-RPC 2.0 method with `result`.
pub async fn mount_rpc(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": 1
        })))
        .mount(server)
        .await;
}

/// Transaction as returned by `eth_getTransactionByHash`.
pub fn evm_transaction(from: &str, to: &str, value: u64, input: &str) -> serde_json::Value {
    json!({
        "hash": DUMMY_TX_HASH,
        "blockNumber": "0x5",
        "transactionIndex": "0x0",
        "from": from,
        "to": to,
        "input": input,
        "value": format!("0x{:x}", value),
        "gas": "0x5208",
        "gasPrice": "0x3b9aca00"
    })
}

/// Serves `tx` mined in block 5 with a head of `head` on chain id 1.
pub async fn mount_evm_payment(
    server: &MockServer,
    tx: serde_json::Value,
    head: u64,
    success: bool,
) {
    mount_rpc(server, "eth_chainId", json!("0x1")).await;
    mount_rpc(server, "eth_getTransactionByHash", tx).await;
    mount_rpc(
        server,
        "eth_getTransactionReceipt",
        json!({ "status": if success { "0x1" } else { "0x0" }, "blockNumber": "0x5" }),
    )
    .await;
    mount_rpc(server, "eth_blockNumber", json!(format!("0x{:x}", head))).await;
}

/// ABI word holding a left-padded address.
pub fn address_word(address: &str) -> String {
    format!("{:0>64}", address.trim_start_matches("0x"))
}

/// ABI word holding an unsigned integer.
pub fn uint_word(value: u64) -> String {
    format!("{:064x}", value)
}

// ============================================================================
// BITCOIN NODE
// ============================================================================

fn btc_response(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "result": result,
        "error": null,
        "id": "chain-clients-btc"
    }))
}

/// Answers `getblockchaininfo` with `chain`.
pub async fn mount_btc_network(server: &MockServer, chain: &str) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getblockchaininfo" })))
        .respond_with(btc_response(json!({ "chain": chain, "blocks": 100 })))
        .mount(server)
        .await;
}

/// Answers `getrawtransaction <txid> true` with `tx`.
pub async fn mount_btc_transaction(server: &MockServer, txid: &str, tx: serde_json::Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": "getrawtransaction", "params": [txid, true] })))
        .respond_with(btc_response(tx))
        .mount(server)
        .await;
}

pub fn btc_output(
    n: u32,
    value: f64,
    address: Option<&str>,
    script_hex: &str,
) -> serde_json::Value {
    let mut script = json!({ "hex": script_hex, "type": "witness_v0_keyhash" });
    if let Some(address) = address {
        script["address"] = json!(address);
    }
    json!({ "value": value, "n": n, "scriptPubKey": script })
}

/// Payment spending one output of the previous transaction, which pays `owner`.
///
/// Outputs: payee, OP_RETURN with `proof`, change to the payer.
pub async fn mount_btc_payment(
    server: &MockServer,
    owner: &str,
    payee: &str,
    value: f64,
    proof: &str,
    confirmations: u64,
) {
    mount_btc_network(server, DUMMY_BTC_NETWORK).await;
    mount_btc_transaction(
        server,
        DUMMY_BTC_PREV_TXID,
        json!({
            "txid": DUMMY_BTC_PREV_TXID,
            "confirmations": 10,
            "vin": [],
            "vout": [btc_output(
                0,
                0.0001,
                Some(owner),
                "0014751e76e8199196d454941c45d1b3a323f1433bd6"
            )]
        }),
    )
    .await;
    mount_btc_transaction(
        server,
        DUMMY_BTC_TXID,
        json!({
            "txid": DUMMY_BTC_TXID,
            "confirmations": confirmations,
            "vin": [{ "txid": DUMMY_BTC_PREV_TXID, "vout": 0 }],
            "vout": [
                btc_output(0, value, Some(payee), "0020"),
                btc_output(1, 0.0, None, &format!("6a20{}", proof)),
                btc_output(2, 0.00008, Some(DUMMY_PAYER_BTC), "0014")
            ]
        }),
    )
    .await;
}

// ============================================================================
// REQUESTS AND CONFIGURATION
// ============================================================================

pub fn evm_request(src: &str, dst: &str) -> VerificationRequest {
    VerificationRequest {
        src: src.to_string(),
        dst: dst.to_string(),
        proof: DUMMY_PROOF.to_string(),
        amount: DUMMY_AMOUNT,
        txid: DUMMY_TX_HASH.to_string(),
        network_id: DUMMY_EVM_NETWORK.to_string(),
    }
}

pub fn btc_request() -> VerificationRequest {
    VerificationRequest {
        src: DUMMY_PAYER_BTC.to_string(),
        dst: DUMMY_PAYEE_BTC.to_string(),
        proof: DUMMY_PROOF.to_string(),
        amount: DUMMY_AMOUNT,
        txid: DUMMY_BTC_TXID.to_string(),
        network_id: DUMMY_BTC_NETWORK.to_string(),
    }
}

/// `token@wallet` compound address.
pub fn compound(token: &str, wallet: &str) -> String {
    format!("{}@{}", token, wallet)
}

/// Builds a registry from `[[chain]]` tables.
pub fn registry(chains: &str) -> VerifierRegistry {
    let config = VerifierConfig::from_toml(chains).unwrap();
    VerifierRegistry::from_config(&config).unwrap()
}

/// Builds the single verifier of a `[[chain]]` table.
pub fn verifier(chain: &str) -> ProofVerifier {
    let config = VerifierConfig::from_toml(chain).unwrap();
    ProofVerifier::from_config(&config.chain[0]).unwrap()
}

pub fn ethereum_chain(name: &str, rpc: &MockServer, confirmations: u64) -> String {
    format!(
        "[[chain]]\nname = \"{}\"\ntype = \"ethereum\"\nrpc_url = \"{}\"\nconfirmations = {}\n",
        name,
        rpc.uri(),
        confirmations
    )
}

pub fn erc20_chain(name: &str, rpc: &MockServer) -> String {
    format!(
        "[[chain]]\nname = \"{}\"\ntype = \"erc20\"\nrpc_url = \"{}\"\nconfirmations = 2\n",
        name,
        rpc.uri()
    )
}

pub fn gateway_chain(name: &str, rpc: &MockServer) -> String {
    format!(
        "[[chain]]\nname = \"{}\"\ntype = \"erc20_gateway\"\nrpc_url = \"{}\"\nconfirmations = 2\ncontract_address = \"{}\"\n",
        name,
        rpc.uri(),
        DUMMY_GATEWAY_ADDR_EVM
    )
}

pub fn bitcoin_chain(name: &str, rpc: &MockServer) -> String {
    format!(
        "[[chain]]\nname = \"{}\"\ntype = \"bitcoin\"\nrpc_url = \"{}\"\nconfirmations = 2\n",
        name,
        rpc.uri()
    )
}
