//! One-shot ledger operations over a JSON state file.
//!
//! Drives the same service the chat transport uses, against the same
//! persisted table, for manual poking and smoke tests.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use punchcoin_ledger::{JsonStore, Ledger};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the persisted user table.
    #[arg(long, default_value = "users.json")]
    state: PathBuf,

    /// Print debug-level logs.
    #[arg(long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register a user (idempotent).
    Register { user: String },
    /// Print a user's balance.
    Balance { user: String },
    /// Claim the earn reward for a user.
    Earn { user: String },
    /// Credit a referral from a referrer using the given code.
    Refer { referrer: String, code: String },
    /// Claim a one-time task reward.
    Task { user: String, task: String },
    /// Print the remaining supply.
    Supply,
    /// Dump every record as JSON.
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Create logger
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let store = JsonStore::new(&args.state);
    let ledger = Ledger::open(store)
        .await
        .with_context(|| format!("open ledger at {}", args.state.display()))?;

    match args.command {
        Command::Register { user } => {
            let registration = ledger.register(&user).await?;
            if registration.created {
                println!("registered {user}");
            } else {
                println!(
                    "{user} is already registered (balance {})",
                    registration.balance
                );
            }
        }
        Command::Balance { user } => {
            println!("{}", ledger.balance(&user).await?);
        }
        Command::Earn { user } => {
            let balance = ledger.earn(&user).await?;
            println!("{user} earned a punch coin (balance {balance})");
        }
        Command::Refer { referrer, code } => {
            let receipt = ledger.complete_referral(&referrer, &code).await?;
            println!(
                "referral credited: {referrer} {} / {code} {} (referrals {})",
                receipt.referrer_balance, receipt.referee_balance, receipt.referral_count
            );
            if let Some(level_up) = receipt.level_up {
                println!("{referrer} reached level {} ({})", level_up.level, level_up.badge);
            }
        }
        Command::Task { user, task } => {
            let receipt = ledger.complete_task(&user, &task).await?;
            println!(
                "{user} completed {} (+{}, balance {})",
                receipt.task, receipt.reward, receipt.balance
            );
        }
        Command::Supply => {
            println!("{}", ledger.total_supply());
        }
        Command::Show => {
            let table = ledger.snapshot();
            println!(
                "{}",
                serde_json::to_string_pretty(&table).context("encode user table")?
            );
        }
    }

    Ok(())
}
