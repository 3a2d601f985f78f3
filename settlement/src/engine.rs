//! Settlement Service
//!
//! Drives one payment per (chain, progress id) through
//! resolve → build → broadcast → await confirmations → register.
//!
//! The progress token written right after broadcast is the only state kept
//! between runs. A run that finds a token skips straight to waiting for
//! confirmations, so re-running a command never pays twice. Confirmation
//! waiting is bounded by `poll_attempts`; a payment that is not deep enough
//! yet is reported as `InProgress` and picked up again by the next run.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use chain_clients_ledger::{
    orders_match, ContinuationTracker, LedgerClient, LedgerOutcome, LedgerSigner, Order, OrderKind,
    OrderResolver, TransactionEncoder,
};
use tracing::{debug, info, warn};

use crate::config::{ChainConfig, PollSettings, SettlementConfig};
use crate::error::SettlementError;
use crate::executors::{ChainExecutor, LegState};
use crate::progress::{ProgressEntry, ProgressStore};
use crate::resolve::{payment_proof, resolve_transfer, SettlementCommand};

/// Result of a settlement run that did not fail
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// Payment confirmed and registered on the ledger; token deleted
    Done {
        message: String,
        /// The registration command committed to the ledger
        command: Vec<String>,
        transaction_id: Option<String>,
    },
    /// Not final yet; run again (or resume `link`) later
    InProgress {
        token: String,
        message: String,
        /// Continuation link when the registration itself is pending
        link: Option<String>,
    },
}

struct ChainEntry {
    config: ChainConfig,
    executor: ChainExecutor,
}

/// Owns every dependency of a settlement run
pub struct SettlementService {
    resolver: OrderResolver,
    tracker: ContinuationTracker,
    encoder: TransactionEncoder,
    progress: ProgressStore,
    chains: HashMap<String, ChainEntry>,
}

impl SettlementService {
    /// Creates the service from validated configuration.
    ///
    /// Reads the ledger signing key from the environment variable named in
    /// `ledger.private_key_env`. Chain secrets are only read when a chain is used.
    ///
    /// # Arguments
    ///
    /// * `config` - Settlement configuration
    ///
    /// # Returns
    ///
    /// * `Ok(SettlementService)` - Successfully created service
    /// * `Err(anyhow::Error)` - Ledger key missing or a chain client could not be built
    pub fn new(config: &SettlementConfig) -> anyhow::Result<Self> {
        let secret = std::env::var(&config.ledger.private_key_env).with_context(|| {
            format!(
                "Ledger signing key not found: environment variable {} is not set",
                config.ledger.private_key_env
            )
        })?;
        let signer = LedgerSigner::from_hex(&secret).context("Invalid ledger signing key")?;
        let client = LedgerClient::new(&config.ledger.rest_url)?;

        let mut chains = HashMap::new();
        for chain in &config.chain {
            let executor = ChainExecutor::from_config(chain)
                .with_context(|| format!("Failed to set up chain '{}'", chain.name()))?;
            chains.insert(
                chain.name().to_string(),
                ChainEntry {
                    config: chain.clone(),
                    executor,
                },
            );
        }

        info!(
            "Settlement service ready: ledger {}, {} chain(s), progress in {}",
            config.ledger.rest_url,
            chains.len(),
            config.progress.directory
        );

        Ok(Self {
            resolver: OrderResolver::new(client.clone()),
            tracker: ContinuationTracker::new(client),
            encoder: TransactionEncoder::new(signer),
            progress: ProgressStore::new(&config.progress.directory),
            chains,
        })
    }

    /// Configured chain names, sorted
    pub fn chain_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.chains.keys().cloned().collect();
        names.sort();
        names
    }

    fn chain(&self, name: &str) -> Result<&ChainEntry, SettlementError> {
        self.chains
            .get(name)
            .ok_or_else(|| SettlementError::Config(format!("Unknown chain '{}'", name)))
    }

    /// Runs (or continues) the settlement of one order on one chain.
    ///
    /// # Arguments
    ///
    /// * `chain` - Configured chain name
    /// * `command` - Order id, gain and optional progress id
    ///
    /// # Returns
    ///
    /// * `Ok(ExecutionOutcome::Done)` - Payment registered on the ledger
    /// * `Ok(ExecutionOutcome::InProgress)` - Waiting for confirmations or for the ledger
    /// * `Err(SettlementError)` - See the error variants
    pub async fn execute(
        &self,
        chain: &str,
        command: &SettlementCommand,
    ) -> Result<ExecutionOutcome, SettlementError> {
        let entry = self.chain(chain)?;
        let progress_id = command.progress_id();
        let _guard = self.progress.lock(chain, progress_id).await?;

        let mut token = match self.progress.load(chain, progress_id).await? {
            Some(token) => {
                info!(
                    "Resuming settlement of order {} on {} from token {}",
                    command.order_id, chain, token
                );
                token
            }
            None => {
                entry.executor.check_config()?;
                let transfer = resolve_transfer(
                    &self.resolver,
                    entry.config.chain_type(),
                    entry.config.network(),
                    command,
                )
                .await?;
                entry.executor.prepare(&transfer).await?;

                let token = entry.executor.broadcast(&transfer).await?;
                self.progress.save(chain, progress_id, &token).await?;
                info!(
                    "Order {} paid on {}, progress token {}",
                    command.order_id, chain, token
                );
                token
            }
        };

        let settings = entry.config.poll_settings();
        let proof = payment_proof(&command.order_id);
        loop {
            let depth = self.await_confirmations(&entry.executor, &token, &settings).await?;
            if depth < settings.confirmations {
                info!(
                    "Order {} on {}: {} of {} confirmations",
                    command.order_id, chain, depth, settings.confirmations
                );
                return Ok(ExecutionOutcome::InProgress {
                    message: format!(
                        "Waiting for confirmations ({} of {})",
                        depth, settings.confirmations
                    ),
                    token,
                    link: None,
                });
            }

            match entry.executor.next_leg(&token, &proof).await? {
                Some(next) => {
                    self.progress.save(chain, progress_id, &next).await?;
                    info!("Order {} on {}: next leg, token {}", command.order_id, chain, next);
                    token = next;
                }
                None => break,
            }
        }

        let txid = entry.executor.settled_txid(&token)?;
        self.register(chain, command, &token, &txid).await
    }

    /// Polls the current leg up to `attempts` times and returns the last depth seen.
    async fn await_confirmations(
        &self,
        executor: &ChainExecutor,
        token: &str,
        settings: &PollSettings,
    ) -> Result<u64, SettlementError> {
        let mut depth = 0;
        for attempt in 1..=settings.attempts {
            match executor.leg_state(token).await? {
                LegState::Reverted => {
                    let txid = executor.current_txid(token);
                    warn!("Transaction {} reverted", txid);
                    return Err(SettlementError::Reverted { txid });
                }
                state => depth = state.depth(),
            }
            debug!("Attempt {}: depth {} (need {})", attempt, depth, settings.confirmations);
            if depth >= settings.confirmations {
                break;
            }
            if attempt < settings.attempts {
                tokio::time::sleep(Duration::from_millis(settings.interval_ms)).await;
            }
        }
        Ok(depth)
    }

    /// Submits the registration batch for a confirmed payment.
    async fn register(
        &self,
        chain: &str,
        command: &SettlementCommand,
        token: &str,
        txid: &str,
    ) -> Result<ExecutionOutcome, SettlementError> {
        let registration = command.registration(txid);
        let batch = self
            .encoder
            .encode(&registration)
            .map_err(SettlementError::ledger)?;
        info!(
            "Registering transfer {} for order {} (batch {})",
            txid, command.order_id, batch.batch_id
        );

        let outcome = self
            .tracker
            .submit(&batch.bytes)
            .await
            .map_err(SettlementError::ledger)?;
        self.conclude(chain, command, token, registration, outcome).await
    }

    /// Maps a ledger verdict onto the run outcome, deleting the token on commit.
    async fn conclude(
        &self,
        chain: &str,
        command: &SettlementCommand,
        token: &str,
        registration: Vec<String>,
        outcome: LedgerOutcome,
    ) -> Result<ExecutionOutcome, SettlementError> {
        match outcome {
            LedgerOutcome::Committed {
                message,
                transaction_id,
            } => {
                self.progress.delete(chain, command.progress_id()).await?;
                info!("Order {} settled on {}: {}", command.order_id, chain, message);
                Ok(ExecutionOutcome::Done {
                    message,
                    command: registration,
                    transaction_id,
                })
            }
            LedgerOutcome::Pending { link } => {
                info!("Registration of order {} pending at {}", command.order_id, link);
                Ok(ExecutionOutcome::InProgress {
                    token: token.to_string(),
                    message: "Registration submitted, waiting for the ledger".to_string(),
                    link: Some(link),
                })
            }
            LedgerOutcome::Rejected { message } => {
                warn!("Registration of order {} rejected: {}", command.order_id, message);
                Err(SettlementError::Ledger(format!(
                    "Registration rejected: {}",
                    message
                )))
            }
        }
    }

    /// Polls a continuation link returned by an earlier run.
    ///
    /// Never resubmits. Requires the progress token of the run that
    /// produced the link to still exist.
    pub async fn finish_registration(
        &self,
        chain: &str,
        command: &SettlementCommand,
        link: &str,
    ) -> Result<ExecutionOutcome, SettlementError> {
        let entry = self.chain(chain)?;
        let progress_id = command.progress_id();
        let _guard = self.progress.lock(chain, progress_id).await?;

        let token = self.progress.load(chain, progress_id).await?.ok_or_else(|| {
            SettlementError::Validation(format!(
                "No settlement in progress for '{}' on {}",
                progress_id, chain
            ))
        })?;
        let txid = entry.executor.settled_txid(&token)?;

        let outcome = self
            .tracker
            .poll(link)
            .await
            .map_err(SettlementError::ledger)?;
        self.conclude(chain, command, &token, command.registration(&txid), outcome)
            .await
    }

    /// Current progress token for a key, if any
    pub async fn status(
        &self,
        chain: &str,
        progress_id: &str,
    ) -> Result<Option<String>, SettlementError> {
        self.chain(chain)?;
        self.progress.load(chain, progress_id).await
    }

    /// Drops a progress token. Returns false when there was none.
    ///
    /// The next `execute` for the key starts from scratch and pays again.
    pub async fn abandon(&self, chain: &str, progress_id: &str) -> Result<bool, SettlementError> {
        self.chain(chain)?;
        let _guard = self.progress.lock(chain, progress_id).await?;
        let removed = self.progress.delete(chain, progress_id).await?;
        if removed {
            warn!("Abandoned progress token for '{}' on {}", progress_id, chain);
        }
        Ok(removed)
    }

    /// Every persisted token, for recovery after a restart
    pub async fn in_flight(&self) -> Result<Vec<ProgressEntry>, SettlementError> {
        self.progress.list().await
    }

    /// Open ask/bid pairs that satisfy the matching rule
    pub async fn matching_orders(&self) -> Result<Vec<(Order, Order)>, SettlementError> {
        let orders = self
            .resolver
            .orders()
            .await
            .map_err(SettlementError::ledger)?;
        let open = |kind: OrderKind| {
            orders
                .iter()
                .filter(move |o| o.kind == kind && o.lock.is_none() && o.transfer.is_none())
        };

        let mut pairs = Vec::new();
        for ask in open(OrderKind::Ask) {
            for bid in open(OrderKind::Bid) {
                if orders_match(ask, bid) {
                    pairs.push((ask.clone(), bid.clone()));
                }
            }
        }
        Ok(pairs)
    }
}
