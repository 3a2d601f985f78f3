//! Settlement library for loan orders
//!
//! Pays a loan order on its external chain, waits for the payment to be
//! confirmed, and registers the transfer on the ledger.

pub mod config;
pub mod engine;
pub mod error;
pub mod executors;
pub mod progress;
pub mod resolve;

// Re-export public types for convenience
pub use config::{ChainConfig, SettlementConfig};
pub use engine::{ExecutionOutcome, SettlementService};
pub use error::SettlementError;
pub use executors::{ChainExecutor, GatewayProgress, LegState};
pub use progress::{ProgressEntry, ProgressLock, ProgressStore};
pub use resolve::{payment_proof, transfer_amount, ResolvedTransfer, SettlementCommand};
