//! Bridge Front Door
//!
//! Line-oriented TCP endpoint in front of the verifier registry. Each
//! connection carries one request line and gets one reply line:
//!
//! ```text
//! <chain> verify <src> <dst> <proof> <amount> <txId> <networkId>
//! ```
//!
//! Replies are `OK`, `REJECTED`, `UNKNOWN_CHAIN` or `BAD_REQUEST`.
//! Connections are served one at a time.

use anyhow::{Context, Result};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use crate::validator::{VerificationRequest, VerifierRegistry};

/// How long a client may take to send its request line
pub const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest accepted request line
pub const MAX_FRAME_BYTES: u64 = 4096;

/// Input discarded after the reply before the connection is closed
const DRAIN_BYTES: u64 = 64 * 1024;
const DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

const VERIFY_ARGUMENTS: usize = 6;

/// Reply sent back for one request line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeReply {
    Ok,
    Rejected,
    UnknownChain,
    BadRequest,
}

impl fmt::Display for BridgeReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BridgeReply::Ok => "OK",
            BridgeReply::Rejected => "REJECTED",
            BridgeReply::UnknownChain => "UNKNOWN_CHAIN",
            BridgeReply::BadRequest => "BAD_REQUEST",
        };
        f.write_str(text)
    }
}

pub struct Bridge {
    registry: VerifierRegistry,
}

impl Bridge {
    pub fn new(registry: VerifierRegistry) -> Self {
        Self { registry }
    }

    /// Answers one request line.
    ///
    /// Checks run in order: token count, chain, subcommand, argument count,
    /// amount. Only a well-formed request reaches the verifier.
    pub async fn handle_line(&self, line: &str) -> BridgeReply {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 2 {
            return BridgeReply::BadRequest;
        }

        let verifier = match self.registry.get(tokens[0]) {
            Some(verifier) => verifier,
            None => {
                warn!("Request for unknown chain '{}'", tokens[0]);
                return BridgeReply::UnknownChain;
            }
        };

        if tokens[1] != "verify" {
            return BridgeReply::BadRequest;
        }
        let args = &tokens[2..];
        if args.len() != VERIFY_ARGUMENTS {
            return BridgeReply::BadRequest;
        }
        let amount: u64 = match args[3].parse() {
            Ok(amount) => amount,
            Err(_) => return BridgeReply::BadRequest,
        };

        let request = VerificationRequest {
            src: args[0].to_string(),
            dst: args[1].to_string(),
            proof: args[2].to_string(),
            amount,
            txid: args[4].to_string(),
            network_id: args[5].to_string(),
        };
        info!("Verifying {} on {}", request.txid, tokens[0]);

        if verifier.verify(&request).await.valid {
            BridgeReply::Ok
        } else {
            BridgeReply::Rejected
        }
    }

    /// Accepts connections until `shutdown` completes.
    ///
    /// # Arguments
    ///
    /// * `listener` - Bound listener
    /// * `shutdown` - Future that resolves when the service should stop
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Bridge shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!("Connection from {}", peer);
                            if let Err(e) = self.handle_connection(stream).await {
                                warn!("Connection from {} failed: {:#}", peer, e);
                            }
                        }
                        Err(e) => warn!("Failed to accept connection: {}", e),
                    }
                }
            }
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<()> {
        let reply = match read_frame(&mut stream).await {
            Some(line) => self.handle_line(&line).await,
            None => BridgeReply::BadRequest,
        };
        stream
            .write_all(format!("{}\n", reply).as_bytes())
            .await
            .context("Failed to write reply")?;
        stream.shutdown().await.context("Failed to close connection")?;

        // Closing with unread input resets the connection and can drop the reply
        let mut rest = (&mut stream).take(DRAIN_BYTES);
        let mut sink = tokio::io::sink();
        let drain = tokio::io::copy(&mut rest, &mut sink);
        let _ = tokio::time::timeout(DRAIN_TIMEOUT, drain).await;
        Ok(())
    }
}

/// Reads one newline-terminated line.
///
/// `None` if it is late, not UTF-8, or has no `\n` within `MAX_FRAME_BYTES`.
async fn read_frame(stream: &mut TcpStream) -> Option<String> {
    let mut reader = BufReader::new(stream.take(MAX_FRAME_BYTES));
    let mut buffer = Vec::new();
    let read = tokio::time::timeout(READ_TIMEOUT, reader.read_until(b'\n', &mut buffer)).await;
    match read {
        Ok(Ok(_)) if buffer.last() == Some(&b'\n') => String::from_utf8(buffer).ok(),
        _ => None,
    }
}

/// Binds the bridge listener.
pub async fn bind(address: &str) -> Result<TcpListener> {
    TcpListener::bind(address)
        .await
        .with_context(|| format!("Failed to bind bridge listener on {}", address))
}
