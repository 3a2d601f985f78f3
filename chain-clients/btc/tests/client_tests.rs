//! Unit tests for the Bitcoin Core JSON-RPC client
//!
//! Every test runs against a wiremock server standing in for bitcoind.

use chain_clients_btc::BtcClient;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DUMMY_TXID: &str = "1111111111111111111111111111111111111111111111111111111111111111";
const DUMMY_WIF: &str = "cMahea7zqjxrtgAbB7LSGbcQUr1uX1ojuat9jZodMN87JcbXMTcA";
const DUMMY_PUBKEY: &str = "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";
const DUMMY_ADDRESS: &str = "bcrt1qw508d6qejxtdg4y5r3zarvary0c5xw7kygt080";

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

async fn mount_result(server: &MockServer, rpc_method: &str, result: serde_json::Value) {
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

fn verbose_transaction(confirmations: Option<u64>) -> serde_json::Value {
    let mut tx = json!({
        "txid": DUMMY_TXID,
        "vin": [{ "txid": "22".repeat(32), "vout": 0 }],
        "vout": [
            {
                "value": 0.00001,
                "n": 0,
                "scriptPubKey": { "hex": "0014abcd", "type": "witness_v0_keyhash", "address": DUMMY_ADDRESS }
            },
            {
                "value": 0.0,
                "n": 1,
                "scriptPubKey": { "hex": format!("6a20{}", "ab".repeat(32)), "type": "nulldata" }
            }
        ]
    });
    if let Some(confirmations) = confirmations {
        tx["confirmations"] = json!(confirmations);
    }
    tx
}

// ============================================================================
// TRANSACTION LOOKUPS
// ============================================================================

/// What is tested: get_raw_transaction() parses outputs, values and scripts
/// Why: The native-coin verifier reads recipient, value and OP_RETURN from here
#[tokio::test]
async fn test_get_raw_transaction_parses_outputs() {
    let server = MockServer::start().await;
    mount_result(&server, "getrawtransaction", verbose_transaction(Some(3))).await;

    let client = BtcClient::new(&server.uri(), None).unwrap();
    let tx = client.get_raw_transaction(DUMMY_TXID).await.unwrap().unwrap();

    assert_eq!(tx.txid, DUMMY_TXID);
    assert_eq!(tx.confirmations, Some(3));
    assert_eq!(tx.vout.len(), 2);
    assert_eq!(tx.vout[0].value_sats().unwrap(), 1000);
    assert_eq!(tx.vout[0].script_pub_key.address.as_deref(), Some(DUMMY_ADDRESS));
    assert_eq!(tx.vout[1].script_pub_key.script_type.as_deref(), Some("nulldata"));
}

/// What is tested: error -5 (unknown transaction) maps to None
/// Why: An unknown txid is a negative answer, not a node failure
#[tokio::test]
async fn test_get_raw_transaction_unknown_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "result": null,
            "error": { "code": -5, "message": "No such mempool or blockchain transaction" },
            "id": "chain-clients-btc"
        })))
        .mount(&server)
        .await;

    let client = BtcClient::new(&server.uri(), None).unwrap();
    assert!(client.get_raw_transaction(DUMMY_TXID).await.unwrap().is_none());
    assert_eq!(client.confirmations(DUMMY_TXID).await.unwrap(), 0);
}

/// What is tested: other node errors are propagated with their message
/// Why: A rejected broadcast must surface as a failure, never as success
#[tokio::test]
async fn test_node_error_is_propagated() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "result": null,
            "error": { "code": -26, "message": "min relay fee not met" },
            "id": "chain-clients-btc"
        })))
        .mount(&server)
        .await;

    let client = BtcClient::new(&server.uri(), None).unwrap();
    let err = client.send_raw_transaction("00").await.unwrap_err();
    assert!(err.to_string().contains("min relay fee not met"));
}

/// What is tested: an unconfirmed transaction reports zero confirmations
/// Why: Mempool transactions omit the confirmations field entirely
#[tokio::test]
async fn test_confirmations_of_mempool_transaction() {
    let server = MockServer::start().await;
    mount_result(&server, "getrawtransaction", verbose_transaction(None)).await;

    let client = BtcClient::new(&server.uri(), None).unwrap();
    assert_eq!(client.confirmations(DUMMY_TXID).await.unwrap(), 0);
}

// ============================================================================
// AUTHENTICATION AND KEYS
// ============================================================================

/// What is tested: RPC credentials are sent as HTTP basic auth
/// Why: bitcoind refuses unauthenticated RPC calls
#[tokio::test]
async fn test_basic_auth_header_is_sent() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header("authorization", "Basic dXNlcjpwYXNz"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "chain": "regtest", "blocks": 101 },
            "error": null,
            "id": "chain-clients-btc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = BtcClient::new(
        &server.uri(),
        Some(("user".to_string(), "pass".to_string())),
    )
    .unwrap();
    let info = client.get_blockchain_info().await.unwrap();
    assert_eq!(info.chain, "regtest");
    assert_eq!(info.blocks, 101);
}

/// What is tested: address_for_key() builds a descriptor from the WIF public key
/// Why: The executor compares this address with the order's source address
#[tokio::test]
async fn test_address_for_key_uses_descriptor_rpcs() {
    let server = MockServer::start().await;
    let descriptor = format!("wpkh({})", DUMMY_PUBKEY);
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "getdescriptorinfo",
            "params": [descriptor]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "descriptor": format!("{}#checksum", descriptor) },
            "error": null,
            "id": "chain-clients-btc"
        })))
        .mount(&server)
        .await;
    mount_result(&server, "deriveaddresses", json!([DUMMY_ADDRESS])).await;

    let client = BtcClient::new(&server.uri(), None).unwrap();
    let address = client.address_for_key(DUMMY_WIF, "wpkh").await.unwrap();
    assert_eq!(address, DUMMY_ADDRESS);
}

/// What is tested: scan_unspent() and the raw transaction RPCs pass their results through
/// Why: The native-coin executor builds, signs and broadcasts with these calls
#[tokio::test]
async fn test_build_sign_broadcast_calls() {
    let server = MockServer::start().await;
    mount_result(
        &server,
        "scantxoutset",
        json!({
            "success": true,
            "height": 105,
            "unspents": [{ "txid": DUMMY_TXID, "vout": 1, "amount": 0.5, "height": 100 }],
            "total_amount": 0.5
        }),
    )
    .await;
    mount_result(&server, "createrawtransaction", json!("0200unsigned")).await;
    mount_result(
        &server,
        "signrawtransactionwithkey",
        json!({ "hex": "0200signed", "complete": true }),
    )
    .await;
    mount_result(&server, "sendrawtransaction", json!(DUMMY_TXID)).await;

    let client = BtcClient::new(&server.uri(), None).unwrap();
    let utxos = client.scan_unspent(DUMMY_ADDRESS).await.unwrap();
    assert_eq!(utxos.len(), 1);
    assert_eq!(utxos[0].vout, 1);
    assert_eq!(utxos[0].confirmations, 6);

    let raw = client
        .create_raw_transaction(
            &[(DUMMY_TXID.to_string(), 1)],
            vec![json!({ DUMMY_ADDRESS: "0.00001000" })],
        )
        .await
        .unwrap();
    assert_eq!(raw, "0200unsigned");

    let signed = client.sign_raw_transaction_with_key(&raw, DUMMY_WIF).await.unwrap();
    assert!(signed.complete);
    assert_eq!(client.send_raw_transaction(&signed.hex).await.unwrap(), DUMMY_TXID);
}

/// What is tested: scan_unspent() asks scantxoutset for the address descriptor and fails on an incomplete scan
/// Why: UTXO lookup must work against a node without a loaded wallet
#[tokio::test]
async fn test_scan_unspent_uses_address_descriptor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "method": "scantxoutset",
            "params": ["start", [format!("addr({})", DUMMY_ADDRESS)]]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "result": { "success": false, "height": 0, "unspents": [], "total_amount": 0 },
            "error": null,
            "id": "chain-clients-btc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = BtcClient::new(&server.uri(), None).unwrap();
    let result = client.scan_unspent(DUMMY_ADDRESS).await;
    assert!(result.is_err());
}
