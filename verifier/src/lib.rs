//! Payment Proof Verifier Library
//!
//! Answers "did this external transaction pay the expected amount, to the
//! expected address, with the expected proof?" for each configured chain,
//! behind a line-oriented TCP front door.

pub mod bridge;
pub mod config;
pub mod validator;

pub use bridge::{Bridge, BridgeReply};
pub use config::{ChainConfig, VerifierConfig};
pub use validator::{
    ProofVerifier, VerificationRequest, VerificationResult, VerifierRegistry,
};
