//! Ledger stress test - hammers a shared ledger with concurrent traffic
//!
//! Usage:
//!   cargo run --release --bin stress -- [OPTIONS]
//!
//! Options:
//!   --state            State file to run against (default: stress-users.json)
//!   -w, --workers      Number of concurrent workers (default: 8)
//!   -o, --ops          Operations per worker (default: 200)
//!   -u, --users        Number of registered users (default: 12)
//!   -s, --seed         Master RNG seed (default: 42)
//!
//! After the run, the accounting identities are checked: the supply debit
//! must equal the coins created, the balance sum must have grown by the same
//! amount, every record must satisfy the structural invariants, and the
//! persisted image must equal the committed table.

use anyhow::{ensure, Context, Result};
use clap::Parser;
use punchcoin_ledger::{JsonStore, Ledger, LedgerError, Store};
use punchcoin_types::{Task, EARN_REWARD, REFERRAL_REWARD, TASK_REWARD};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about = "Concurrent load exerciser for the punch coin ledger")]
struct Args {
    /// State file to run against.
    #[arg(long, default_value = "stress-users.json")]
    state: std::path::PathBuf,

    #[arg(short, long, default_value = "8")]
    workers: usize,

    /// Operations per worker.
    #[arg(short, long, default_value = "200")]
    ops: usize,

    /// Number of registered users the traffic is spread over.
    #[arg(short, long, default_value = "12")]
    users: usize,

    /// Master RNG seed.
    #[arg(short, long, default_value = "42")]
    seed: u64,
}

/// Global operation counters.
struct Tally {
    earns: AtomicU64,
    referrals: AtomicU64,
    tasks: AtomicU64,
    repeat_tasks: AtomicU64,
}

impl Tally {
    fn new() -> Self {
        Self {
            earns: AtomicU64::new(0),
            referrals: AtomicU64::new(0),
            tasks: AtomicU64::new(0),
            repeat_tasks: AtomicU64::new(0),
        }
    }

    /// Coins every counted operation should have created in total.
    fn coins_created(&self) -> u64 {
        self.earns.load(Ordering::Relaxed) * EARN_REWARD
            + self.referrals.load(Ordering::Relaxed) * 2 * REFERRAL_REWARD
            + self.tasks.load(Ordering::Relaxed) * TASK_REWARD
    }

    fn print_summary(&self, elapsed: Duration) {
        let earns = self.earns.load(Ordering::Relaxed);
        let referrals = self.referrals.load(Ordering::Relaxed);
        let tasks = self.tasks.load(Ordering::Relaxed);
        let repeats = self.repeat_tasks.load(Ordering::Relaxed);
        let total = earns + referrals + tasks + repeats;

        let ops_per_sec = if elapsed.as_secs_f64() > 0.0 {
            total as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };

        info!("=== STRESS RESULTS ===");
        info!("Duration: {:.2}s", elapsed.as_secs_f64());
        info!(
            "Operations: {} earns, {} referrals, {} tasks ({} repeat claims rejected)",
            earns, referrals, tasks, repeats
        );
        info!("Throughput: {:.2} ops/s", ops_per_sec);
        info!("Coins created: {}", self.coins_created());
    }
}

/// Run one worker's slice of the traffic.
async fn run_worker(
    ledger: Arc<Ledger<JsonStore>>,
    users: Arc<Vec<String>>,
    ops: usize,
    seed: u64,
    tally: Arc<Tally>,
) -> Result<()> {
    let mut rng = StdRng::seed_from_u64(seed);

    for _ in 0..ops {
        let user = &users[rng.gen_range(0..users.len())];
        match rng.gen_range(0..10u8) {
            // Mostly earns, the hot path.
            0..=6 => {
                ledger.earn(user).await.context("earn failed")?;
                tally.earns.fetch_add(1, Ordering::Relaxed);
            }
            7..=8 => {
                // Any registered target, self included.
                let referee = &users[rng.gen_range(0..users.len())];
                ledger
                    .complete_referral(user, referee)
                    .await
                    .context("referral failed")?;
                tally.referrals.fetch_add(1, Ordering::Relaxed);
            }
            _ => {
                let task = Task::ALL[rng.gen_range(0..Task::ALL.len())];
                match ledger.complete_task(user, task.name()).await {
                    Ok(_) => {
                        tally.tasks.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(LedgerError::TaskAlreadyCompleted(_)) => {
                        tally.repeat_tasks.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => return Err(err).context("task claim failed"),
                }
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse args
    let args = Args::parse();

    // Setup logging
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    info!(
        "Starting stress run: {} workers x {} ops over {} users",
        args.workers, args.ops, args.users
    );

    let ledger = Arc::new(
        Ledger::open(JsonStore::new(&args.state))
            .await
            .with_context(|| format!("open ledger at {}", args.state.display()))?,
    );

    let users: Arc<Vec<String>> = Arc::new((0..args.users).map(|i| format!("user{i}")).collect());
    for user in users.iter() {
        ledger.register(user).await.context("register user")?;
    }

    // Baselines so a pre-existing state file does not skew the checks.
    let supply_before = ledger.total_supply();
    let issued_before: u64 = ledger.snapshot().values().map(|record| record.coins).sum();

    let tally = Arc::new(Tally::new());
    let start = Instant::now();

    let mut handles = Vec::new();
    for worker in 0..args.workers {
        let ledger = Arc::clone(&ledger);
        let users = Arc::clone(&users);
        let tally = Arc::clone(&tally);
        let seed = args.seed.wrapping_add(worker as u64);
        handles.push(tokio::spawn(run_worker(
            ledger, users, args.ops, seed, tally,
        )));
    }

    let results = futures::future::try_join_all(handles)
        .await
        .context("worker panicked")?;
    for result in results {
        result?;
    }
    let elapsed = start.elapsed();

    // Accounting identities.
    let created = tally.coins_created();
    let supply_delta = supply_before - ledger.total_supply();
    ensure!(
        supply_delta == created as i64,
        "supply debit {supply_delta} != coins created {created}"
    );

    let table = ledger.snapshot();
    let issued_after: u64 = table.values().map(|record| record.coins).sum();
    ensure!(
        issued_after - issued_before == created,
        "balance growth {} != coins created {created}",
        issued_after - issued_before
    );

    for (user, record) in &table {
        record
            .validate()
            .with_context(|| format!("invariants violated for {user}"))?;
    }

    let persisted = ledger.store().load().await.context("reload state file")?;
    ensure!(
        persisted == table,
        "persisted image diverged from the committed table"
    );

    tally.print_summary(elapsed);
    info!("accounting identities hold");

    Ok(())
}
