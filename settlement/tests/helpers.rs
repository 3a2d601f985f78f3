//! Shared test helpers for settlement tests
//!
//! Constants, ledger record mocks, chain RPC mocks and a config builder.

#![allow(dead_code)]

use base64::Engine;
use chain_clients_ledger::{
    decode_batch_list, encode_record, record_address, AddressRecord, Order, OrderKind, RecordType,
};
use serde::Serialize;
use serde_json::json;
use settlement::{SettlementConfig, SettlementService};
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ============================================================================
// CONSTANTS
// ============================================================================

// -------------------------------- KEYS ----------------------------------

/// Ledger signing key (secp256k1 scalar 2)
pub const DUMMY_LEDGER_KEY: &str =
    "0000000000000000000000000000000000000000000000000000000000000002";

/// EVM payer key (secp256k1 scalar 1)
pub const DUMMY_EVM_KEY: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000001";

/// Testnet WIF of secp256k1 scalar 1 (compressed)
pub const DUMMY_WIF: &str = "cMahea7zqjxrtgAbB7LSGbcQUr1uX1ojuat9jZodMN87JcbXMTcA";

// ------------------------------ ADDRESSES -------------------------------

/// Address controlled by DUMMY_EVM_KEY
pub const DUMMY_PAYER_EVM: &str = "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf";

/// Address of secp256k1 scalar 2
pub const DUMMY_PAYEE_EVM: &str = "0x2b5ad5c4795c026514f8317c7a215e218dccd6cf";

/// Token contract (EVM format, 40 hex characters)
pub const DUMMY_TOKEN_ADDR_EVM: &str = "0x000000000000000000000000000000000000000a";

/// Gateway contract (EVM format, 40 hex characters)
pub const DUMMY_GATEWAY_ADDR_EVM: &str = "0x000000000000000000000000000000000000000e";

pub const DUMMY_PAYER_BTC: &str = "bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080";
pub const DUMMY_PAYEE_BTC: &str = "bcrt1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qzf6z2f";

// --------------------------------- IDS ----------------------------------

pub const DUMMY_ORDER_ID: &str = "order-1";
pub const DUMMY_SRC_ADDRESS_ID: &str = "addr-src";
pub const DUMMY_DST_ADDRESS_ID: &str = "addr-dst";
pub const DUMMY_NETWORK: &str = "mainnet";

/// Transaction hashes (EVM format, 64 hex characters)
pub const DUMMY_TX_HASH: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000010";
pub const DUMMY_TX_HASH_2: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000011";

pub const DUMMY_BTC_TXID: &str =
    "1111111111111111111111111111111111111111111111111111111111111111";

pub const DUMMY_BATCH_ID: &str = "b1";
pub const DUMMY_LEDGER_TXN_ID: &str = "t1";

// ============================================================================
// LEDGER RECORDS
// ============================================================================

pub fn dummy_order(amount: u64) -> Order {
    Order {
        id: DUMMY_ORDER_ID.to_string(),
        kind: OrderKind::Deal,
        amount,
        interest: 10,
        maturity: 100,
        fee: 1,
        expiration: 0,
        src_address: DUMMY_SRC_ADDRESS_ID.to_string(),
        dst_address: Some(DUMMY_DST_ADDRESS_ID.to_string()),
        block_height: 7,
        owner: "owner".to_string(),
        transfer: None,
        lock: None,
        previous_owner: None,
        loan_transfer: None,
        repayment_transfer: None,
    }
}

pub fn dummy_address(id: &str, blockchain: &str, value: &str) -> AddressRecord {
    AddressRecord {
        id: id.to_string(),
        blockchain: blockchain.to_string(),
        value: value.to_string(),
        network: DUMMY_NETWORK.to_string(),
        owner: "owner".to_string(),
    }
}

/// Serves one record from `GET /state?address=<record address>`.
pub async fn mount_record<T: Serialize>(
    server: &MockServer,
    record_type: RecordType,
    id: &str,
    record: &T,
) {
    let address = record_address(record_type, id);
    let data = base64::engine::general_purpose::STANDARD.encode(encode_record(record).unwrap());
    Mock::given(method("GET"))
        .and(path("/state"))
        .and(query_param("address", address.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "address": address, "data": data }],
            "paging": {}
        })))
        .mount(server)
        .await;
}

/// Mounts the order plus its source and destination address records.
pub async fn mount_order_with_addresses(
    server: &MockServer,
    amount: u64,
    blockchain: &str,
    src_value: &str,
    dst_value: &str,
) {
    mount_record(server, RecordType::Order, DUMMY_ORDER_ID, &dummy_order(amount)).await;
    mount_record(
        server,
        RecordType::Address,
        DUMMY_SRC_ADDRESS_ID,
        &dummy_address(DUMMY_SRC_ADDRESS_ID, blockchain, src_value),
    )
    .await;
    mount_record(
        server,
        RecordType::Address,
        DUMMY_DST_ADDRESS_ID,
        &dummy_address(DUMMY_DST_ADDRESS_ID, blockchain, dst_value),
    )
    .await;
}

pub fn status_link(server: &MockServer) -> String {
    format!("{}/batch_statuses?id={}", server.uri(), DUMMY_BATCH_ID)
}

/// `POST /batches` answers with a status link.
pub async fn mount_batch_submit(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/batches"))
        .respond_with(
            ResponseTemplate::new(202).set_body_json(json!({ "link": status_link(server) })),
        )
        .mount(server)
        .await;
}

fn status_body(status: &str) -> serde_json::Value {
    let mut record = json!({ "id": DUMMY_BATCH_ID, "status": status, "invalid_transactions": [] });
    if status == "INVALID" {
        record["invalid_transactions"] = json!([{
            "id": DUMMY_LEDGER_TXN_ID,
            "message": "Order already settled"
        }]);
    }
    json!({ "data": [record] })
}

/// Batch status answers with `status` (COMMITTED, PENDING, INVALID).
pub async fn mount_batch_status(server: &MockServer, status: &str) {
    Mock::given(method("GET"))
        .and(path("/batch_statuses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(status)))
        .mount(server)
        .await;
}

/// Batch status answers with `status` exactly once.
pub async fn mount_batch_status_once(server: &MockServer, status: &str) {
    Mock::given(method("GET"))
        .and(path("/batch_statuses"))
        .respond_with(ResponseTemplate::new(200).set_body_json(status_body(status)))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// `GET /batches?id=` resolves the committed transaction id.
pub async fn mount_batch_lookup(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/batches"))
        .and(query_param("id", DUMMY_BATCH_ID))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{
                "header_signature": DUMMY_BATCH_ID,
                "transactions": [{ "header_signature": DUMMY_LEDGER_TXN_ID }]
            }]
        })))
        .mount(server)
        .await;
}

/// Commands carried by every batch POSTed to the ledger, in order.
pub async fn submitted_commands(server: &MockServer) -> Vec<Vec<String>> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.method.to_string() == "POST" && r.url.path() == "/batches")
        .flat_map(|r| decode_batch_list(&r.body).unwrap())
        .collect()
}

// ============================================================================
// CHAIN RPC
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

/// Answers a JSON-RPC 2.0 method with `result` exactly once.
pub async fn mount_rpc_once(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": 1
        })))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// Answers a JSON-RPC 2.0 method with an error exactly once.
pub async fn mount_rpc_error_once(server: &MockServer, rpc_method: &str, message: &str) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "error": { "code": -32000, "message": message },
            "id": 1
        })))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// Everything `send_evm_transaction` calls except `eth_sendRawTransaction`.
pub async fn mount_evm_send_prerequisites(server: &MockServer) {
    mount_rpc(server, "eth_getTransactionCount", json!("0x0")).await;
    mount_rpc(server, "eth_gasPrice", json!("0x3b9aca00")).await;
    mount_rpc(server, "eth_estimateGas", json!("0x5208")).await;
    mount_rpc(server, "eth_chainId", json!("0x1")).await;
}

/// Successful receipt mined in `block`.
pub async fn mount_receipt(server: &MockServer, block: u64, success: bool) {
    mount_rpc(
        server,
        "eth_getTransactionReceipt",
        json!({
            "status": if success { "0x1" } else { "0x0" },
            "blockNumber": format!("0x{:x}", block)
        }),
    )
    .await;
}

/// JSON-RPC request bodies sent for `rpc_method`, in order.
pub async fn rpc_requests(server: &MockServer, rpc_method: &str) -> Vec<serde_json::Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter_map(|r| serde_json::from_slice::<serde_json::Value>(&r.body).ok())
        .filter(|body| body["method"] == rpc_method)
        .collect()
}

/// Answers a Bitcoin Core JSON-RPC 1.0 method with `result`.
pub async fn mount_btc_rpc(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
    Mock::given(method("POST"))
        .and(body_partial_json(json!({ "method": rpc_method })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": result,
            "error": null,
            "id": "chain-clients-btc"
        })))
        .mount(server)
        .await;
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Builds a configuration whose progress store lives in `dir`.
///
/// `chains` is appended verbatim and holds the `[[chain]]` tables.
pub fn test_config(
    ledger: &MockServer,
    dir: &TempDir,
    ledger_key_env: &str,
    chains: &str,
) -> SettlementConfig {
    let toml = format!(
        r#"
[ledger]
rest_url = "{}"
private_key_env = "{}"

[progress]
directory = "{}"

{}
"#,
        ledger.uri(),
        ledger_key_env,
        dir.path().display(),
        chains
    );
    SettlementConfig::from_toml(&toml).unwrap()
}

/// Sets the ledger key under `ledger_key_env` and builds the service.
pub fn test_service(config: &SettlementConfig) -> SettlementService {
    std::env::set_var(&config.ledger.private_key_env, DUMMY_LEDGER_KEY);
    SettlementService::new(config).unwrap()
}

/// `[[chain]]` table for an account-based chain.
pub fn ethereum_chain(name: &str, rpc: &MockServer, key_env: &str, confirmations: u64) -> String {
    format!(
        r#"
[[chain]]
name = "{}"
type = "ethereum"
rpc_url = "{}"
secret_key_env = "{}"
confirmations = {}
network = "{}"
poll_interval_ms = 10
"#,
        name,
        rpc.uri(),
        key_env,
        confirmations,
        DUMMY_NETWORK
    )
}
