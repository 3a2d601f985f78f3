//! Tests for the bridge front door
//!
//! Request parsing and reply mapping through `handle_line`, plus a real TCP
//! round trip through `serve`.

mod helpers;

use helpers::*;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use verifier::bridge::{self, Bridge, BridgeReply};
use wiremock::MockServer;

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Bridge with one ethereum chain named "eth" serving a valid payment.
async fn bridge_with_payment() -> (MockServer, Bridge) {
    let server = MockServer::start().await;
    mount_evm_payment(
        &server,
        evm_transaction(
            DUMMY_PAYER_EVM,
            DUMMY_PAYEE_EVM,
            DUMMY_AMOUNT,
            &format!("0x{}", DUMMY_PROOF),
        ),
        6,
        true,
    )
    .await;
    let bridge = Bridge::new(registry(&ethereum_chain("eth", &server, 2)));
    (server, bridge)
}

fn verify_line(amount: &str) -> String {
    format!(
        "eth verify {} {} {} {} {} {}",
        DUMMY_PAYER_EVM, DUMMY_PAYEE_EVM, DUMMY_PROOF, amount, DUMMY_TX_HASH, DUMMY_EVM_NETWORK
    )
}

async fn exchange(address: std::net::SocketAddr, frame: &[u8]) -> String {
    let mut stream = TcpStream::connect(address).await.unwrap();
    stream.write_all(frame).await.unwrap();
    let mut reply = String::new();
    stream.read_to_string(&mut reply).await.unwrap();
    reply
}

// ============================================================================
// REQUEST HANDLING
// ============================================================================

/// What is tested: a matching claim gets OK, a corrupted one REJECTED
/// Why: The reply mirrors the verifier's verdict
#[tokio::test]
async fn test_verify_replies_ok_and_rejected() {
    let (_server, bridge) = bridge_with_payment().await;

    assert_eq!(bridge.handle_line(&verify_line("1000")).await, BridgeReply::Ok);
    assert_eq!(bridge.handle_line(&verify_line("999")).await, BridgeReply::Rejected);
}

/// What is tested: malformed requests get BAD_REQUEST and unknown chains UNKNOWN_CHAIN
/// Why: Checks run in a fixed order: token count, chain, subcommand, arguments, amount
#[tokio::test]
async fn test_malformed_requests() {
    let (_server, bridge) = bridge_with_payment().await;

    let cases = [
        ("", BridgeReply::BadRequest),
        ("eth", BridgeReply::BadRequest),
        ("doge", BridgeReply::BadRequest),
        ("doge verify a b c 1 t n", BridgeReply::UnknownChain),
        ("eth transfer a b c 1 t n", BridgeReply::BadRequest),
        ("eth verify a b c 1 t", BridgeReply::BadRequest),
        ("eth verify a b c 1 t n extra", BridgeReply::BadRequest),
        ("eth verify a b c ten t n", BridgeReply::BadRequest),
        ("eth verify a b c -5 t n", BridgeReply::BadRequest),
    ];
    for (line, expected) in cases {
        assert_eq!(bridge.handle_line(line).await, expected, "line: {:?}", line);
    }
}

#[test]
fn test_reply_wire_text() {
    assert_eq!(BridgeReply::Ok.to_string(), "OK");
    assert_eq!(BridgeReply::Rejected.to_string(), "REJECTED");
    assert_eq!(BridgeReply::UnknownChain.to_string(), "UNKNOWN_CHAIN");
    assert_eq!(BridgeReply::BadRequest.to_string(), "BAD_REQUEST");
}

// ============================================================================
// TCP SERVING
// ============================================================================

/// What is tested: one request line per connection, one reply line, then close
/// Why: Clients read until EOF to get the reply
#[tokio::test]
async fn test_serve_answers_each_connection() {
    let (_server, bridge) = bridge_with_payment().await;
    let listener = bridge::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        bridge
            .serve(listener, async {
                let _ = stopped.await;
            })
            .await
    });

    let ok = exchange(address, format!("{}\n", verify_line("1000")).as_bytes()).await;
    assert_eq!(ok, "OK\n");

    let unknown = exchange(address, b"doge verify a b c 1 t n\r\n").await;
    assert_eq!(unknown, "UNKNOWN_CHAIN\n");

    let unreadable = exchange(address, &[0xff, 0xfe, b'\n']).await;
    assert_eq!(unreadable, "BAD_REQUEST\n");

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();
}

/// What is tested: a request line longer than MAX_FRAME_BYTES, or one without a newline, gets BAD_REQUEST
/// Why: A truncated frame must never be parsed as a request
#[tokio::test]
async fn test_serve_rejects_unterminated_frames() {
    let (_server, bridge) = bridge_with_payment().await;
    let listener = bridge::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();

    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        bridge
            .serve(listener, async {
                let _ = stopped.await;
            })
            .await
    });

    // First 4096 bytes hold two tokens, the arguments sit past the limit
    let oversized = format!("nope x{}{}\n", " ".repeat(5000), verify_line("1000"));
    assert!(oversized.len() as u64 > bridge::MAX_FRAME_BYTES);
    let reply = exchange(address, oversized.as_bytes()).await;
    assert_eq!(reply, "BAD_REQUEST\n");

    // A valid request cut off before its newline
    let mut unterminated = TcpStream::connect(address).await.unwrap();
    unterminated.write_all(verify_line("1000").as_bytes()).await.unwrap();
    unterminated.shutdown().await.unwrap();
    let mut reply = String::new();
    unterminated.read_to_string(&mut reply).await.unwrap();
    assert_eq!(reply, "BAD_REQUEST\n");

    // The listener keeps serving afterwards
    let ok = exchange(address, format!("{}\n", verify_line("1000")).as_bytes()).await;
    assert_eq!(ok, "OK\n");

    stop.send(()).unwrap();
    handle.await.unwrap().unwrap();
}
