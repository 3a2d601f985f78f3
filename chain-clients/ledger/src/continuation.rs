//! Continuation Tracker
//!
//! Submits a batch and checks its status exactly once. When the ledger has
//! not reached a verdict yet the caller receives the status link back and can
//! poll it later, possibly from another process, without resubmitting.

use anyhow::Result;
use tracing::info;

use crate::client::{BatchStatus, LedgerClient};

/// Result of a submission or of a later poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerOutcome {
    /// The batch is final
    Committed {
        message: String,
        transaction_id: Option<String>,
    },
    /// The ledger rejected the transaction
    Rejected { message: String },
    /// No verdict yet; poll `link` again later
    Pending { link: String },
}

/// Wraps batch submission with a resumable status link
#[derive(Clone)]
pub struct ContinuationTracker {
    client: LedgerClient,
}

impl ContinuationTracker {
    pub fn new(client: LedgerClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &LedgerClient {
        &self.client
    }

    /// Submits `envelope` and performs one status check.
    pub async fn submit(&self, envelope: &[u8]) -> Result<LedgerOutcome> {
        let link = self.client.submit_batch(envelope).await?;
        info!("Batch submitted, status link {}", link);
        self.poll(&link).await
    }

    /// Re-checks a status link. Never resubmits anything.
    pub async fn poll(&self, link: &str) -> Result<LedgerOutcome> {
        let outcome = match self.client.resolve_link(link, true).await? {
            BatchStatus::Committed { transaction_id } => {
                let message = match &transaction_id {
                    Some(id) => format!("Transaction {} committed", id),
                    None => "Batch committed".to_string(),
                };
                LedgerOutcome::Committed {
                    message,
                    transaction_id,
                }
            }
            BatchStatus::Invalid { message } => LedgerOutcome::Rejected { message },
            BatchStatus::Pending => LedgerOutcome::Pending {
                link: link.to_string(),
            },
        };
        Ok(outcome)
    }
}
