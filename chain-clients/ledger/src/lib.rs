//! Permissioned ledger client library
//!
//! Transaction encoding, REST access, continuation tracking, and decoding of
//! the order, address and transfer records the settlement flow reads.

pub mod client;
pub mod continuation;
pub mod encoder;
pub mod protos;
pub mod state;

// Re-export for convenience
pub use client::{BatchStatus, LedgerClient, StateEntry};
pub use continuation::{ContinuationTracker, LedgerOutcome};
pub use encoder::{
    decode_batch_list, decode_payload, encode_payload, namespace, sighash, EncodedBatch,
    LedgerSigner, TransactionEncoder, FAMILY_NAME, FAMILY_VERSION,
};
pub use state::{
    decode_record, encode_record, orders_match, record_address, AddressRecord, Order, OrderKind,
    OrderResolver, RecordType, Transfer,
};
