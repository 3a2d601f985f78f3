//! Settlement error taxonomy

use thiserror::Error;

/// Failures reported by a settlement run.
///
/// A payment that is simply not final yet is not an error; see
/// `ExecutionOutcome::InProgress`.
#[derive(Debug, Error)]
pub enum SettlementError {
    /// Missing or invalid configuration (secret, RPC URL, fee, contract)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The order, addresses or amounts do not allow this payment
    #[error("Validation error: {0}")]
    Validation(String),

    /// RPC failure. When `token_preserved` is false nothing was broadcast.
    #[error("Transient RPC error (progress token preserved: {token_preserved}): {message}")]
    Transient {
        message: String,
        token_preserved: bool,
    },

    /// The external transaction was mined but its execution failed
    #[error("Transaction {txid} reverted; progress token kept for inspection")]
    Reverted { txid: String },

    /// The ledger rejected or could not accept the registration
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Reading or writing the progress store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Another process holds the lock file for this progress key
    #[error("Progress key is locked by another run (lock file {0})")]
    Locked(String),
}

impl SettlementError {
    /// Wraps an RPC failure, keeping the full context chain in the message.
    pub fn transient(error: anyhow::Error, token_preserved: bool) -> Self {
        SettlementError::Transient {
            message: format!("{:#}", error),
            token_preserved,
        }
    }

    pub fn ledger(error: anyhow::Error) -> Self {
        SettlementError::Ledger(format!("{:#}", error))
    }
}
