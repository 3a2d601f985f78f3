//! Settlement CLI
//!
//! Runs one settlement step per invocation. Re-running `execute` with the
//! same arguments continues from the persisted progress token and never pays
//! twice.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin settle -- --config settlement.toml execute eth-main order-1 0
//! cargo run --bin settle -- resume eth-main order-1 0 http://127.0.0.1:8008/batch_statuses?id=...
//! cargo run --bin settle -- list
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use settlement::{ExecutionOutcome, SettlementCommand, SettlementConfig, SettlementService};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "settle")]
#[command(about = "Settle loan orders on external chains and register them on the ledger")]
struct Args {
    /// Path to settlement configuration file (default: config/settlement.toml or SETTLEMENT_CONFIG_PATH env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Pay an order (or continue a payment already in progress)
    Execute {
        chain: String,
        order_id: String,
        /// Signed gain; "0" pays source to destination, anything else pays back
        #[arg(allow_hyphen_values = true)]
        gain: String,
        #[arg(long)]
        progress_id: Option<String>,
    },
    /// Poll a registration link returned by an earlier run
    Resume {
        chain: String,
        order_id: String,
        #[arg(allow_hyphen_values = true)]
        gain: String,
        link: String,
        #[arg(long)]
        progress_id: Option<String>,
    },
    /// Show the progress token for a key
    Status { chain: String, progress_id: String },
    /// Drop a progress token (the next execute pays again)
    Abandon { chain: String, progress_id: String },
    /// List every payment in flight
    List,
    /// List open ask/bid pairs that match
    Matches,
}

fn settlement_command(
    order_id: String,
    gain: String,
    progress_id: Option<String>,
) -> SettlementCommand {
    let command = SettlementCommand::new(order_id, gain);
    match progress_id {
        Some(id) => command.with_progress_id(id),
        None => command,
    }
}

fn print_outcome(outcome: &ExecutionOutcome) {
    match outcome {
        ExecutionOutcome::Done {
            message,
            command,
            transaction_id,
        } => {
            println!("DONE {}", message);
            println!("  command: {}", command.join(" "));
            if let Some(id) = transaction_id {
                println!("  ledger transaction: {}", id);
            }
        }
        ExecutionOutcome::InProgress {
            token,
            message,
            link,
        } => {
            println!("IN_PROGRESS {}", message);
            println!("  token: {}", token);
            if let Some(link) = link {
                println!("  link: {}", link);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize structured logging
    tracing_subscriber::fmt::init();

    let config = SettlementConfig::load_from_path(args.config.as_deref())?;
    let service = SettlementService::new(&config)?;
    info!("Chains: {}", service.chain_names().join(", "));

    match args.command {
        Command::Execute {
            chain,
            order_id,
            gain,
            progress_id,
        } => {
            let in_flight = service.in_flight().await?;
            if !in_flight.is_empty() {
                info!("{} payment(s) in flight", in_flight.len());
            }
            let command = settlement_command(order_id, gain, progress_id);
            let outcome = service.execute(&chain, &command).await?;
            print_outcome(&outcome);
        }
        Command::Resume {
            chain,
            order_id,
            gain,
            link,
            progress_id,
        } => {
            let command = settlement_command(order_id, gain, progress_id);
            let outcome = service.finish_registration(&chain, &command, &link).await?;
            print_outcome(&outcome);
        }
        Command::Status { chain, progress_id } => {
            match service.status(&chain, &progress_id).await? {
                Some(token) => println!("{}", token),
                None => println!("No payment in progress for '{}' on {}", progress_id, chain),
            }
        }
        Command::Abandon { chain, progress_id } => {
            if service.abandon(&chain, &progress_id).await? {
                println!("Abandoned '{}' on {}", progress_id, chain);
            } else {
                warn!("Nothing to abandon for '{}' on {}", progress_id, chain);
            }
        }
        Command::List => {
            for entry in service.in_flight().await? {
                println!("{}\t{}\t{}", entry.chain, entry.progress_id, entry.token);
            }
        }
        Command::Matches => {
            for (ask, bid) in service.matching_orders().await? {
                println!(
                    "ask {} <-> bid {} (amount {}, interest {}/{} vs {}/{})",
                    ask.id,
                    bid.id,
                    ask.amount,
                    ask.interest,
                    ask.maturity,
                    bid.interest,
                    bid.maturity
                );
            }
        }
    }

    Ok(())
}
