use crate::error::LedgerError;
use crate::notify::{self, LedgerEvent};
use crate::store::Store;
use anyhow::Context as _;
use punchcoin_types::{
    ReferralReceipt, Registration, Task, TaskReceipt, UserRecord, UserTable, EARN_REWARD,
    INITIAL_SUPPLY, REFERRAL_REWARD, TASK_REWARD,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

/// Concurrent punch coin ledger.
///
/// Operations on different users run in parallel; operations touching the
/// same record are serialized by a per-user guard. Every mutation is
/// persisted before it becomes visible, so a storage failure discards the
/// attempted change instead of leaving memory ahead of the store.
///
/// Lock order is fixed: user guards (lexicographic by id), then the commit
/// lock, then the table lock. The table lock is only ever held in synchronous
/// sections.
pub struct Ledger<S> {
    store: S,
    /// Committed user table.
    table: RwLock<UserTable>,
    /// Per-user guards serializing read-modify-write cycles on one record.
    /// Created on demand and retained for the service lifetime, like the
    /// records they protect.
    guards: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
    /// Serializes snapshot, save, and commit so the persisted image always
    /// converges to the latest committed state.
    commit: Mutex<()>,
    /// Coins remaining in the distribution pool. May go negative once the
    /// pool is exhausted; nothing stops awards at zero.
    supply: AtomicI64,
    events: broadcast::Sender<LedgerEvent>,
}

impl<S: Store> Ledger<S> {
    /// Load persisted state and start serving.
    ///
    /// Every loaded record is checked against the structural invariants and
    /// the remaining supply is reconciled against the coins already issued,
    /// so the supply identity survives restarts. A missing store image means
    /// a fresh ledger; any other load failure refuses to construct.
    pub async fn open(store: S) -> anyhow::Result<Self> {
        let table = store.load().await.context("load user table")?;
        for (user_id, record) in &table {
            record
                .validate()
                .with_context(|| format!("invalid record for user {user_id:?}"))?;
        }

        let issued: i128 = table.values().map(|record| i128::from(record.coins)).sum();
        let supply = i64::try_from(i128::from(INITIAL_SUPPLY) - issued)
            .context("issued coins exceed representable supply")?;

        info!(users = table.len(), supply, "ledger opened");
        Ok(Self {
            store,
            table: RwLock::new(table),
            guards: StdMutex::new(HashMap::new()),
            commit: Mutex::new(()),
            supply: AtomicI64::new(supply),
            events: notify::channel(),
        })
    }

    /// Register a user, or report their standing balance if already known.
    ///
    /// Idempotent: repeat calls never mutate the record.
    pub async fn register(&self, user_id: &str) -> Result<Registration, LedgerError> {
        let guard = self.guard_for(user_id);
        let _serial = guard.lock().await;

        let existing = {
            let table = self.read_table();
            table.get(user_id).map(|record| record.coins)
        };
        if let Some(balance) = existing {
            debug!(user = user_id, balance, "already registered");
            return Ok(Registration {
                balance,
                created: false,
            });
        }

        self.commit_records(vec![(user_id.to_string(), UserRecord::new())], 0)
            .await?;
        debug!(user = user_id, "registered");
        Ok(Registration {
            balance: 0,
            created: true,
        })
    }

    /// Current balance.
    pub async fn balance(&self, user_id: &str) -> Result<u64, LedgerError> {
        let table = self.read_table();
        table
            .get(user_id)
            .map(|record| record.coins)
            .ok_or_else(|| LedgerError::NotRegistered(user_id.to_string()))
    }

    /// Claim the earn reward: one coin, debited from the supply.
    ///
    /// The coin-earned event fires only after the mutation has been persisted
    /// and every lock released.
    pub async fn earn(&self, user_id: &str) -> Result<u64, LedgerError> {
        let guard = self.guard_for(user_id);
        let balance = {
            let _serial = guard.lock().await;
            let mut record = self.committed(user_id)?;
            record.coins += EARN_REWARD;
            let balance = record.coins;
            self.commit_records(vec![(user_id.to_string(), record)], EARN_REWARD as i64)
                .await?;
            balance
        }; // Release the user guard before notifying
        self.notify_coin_earned(user_id, balance);
        debug!(user = user_id, balance, "earn claimed");
        Ok(balance)
    }

    /// Credit a referral: both sides receive the reward, the referrer's
    /// referral count advances, and a level-up is applied if one is due.
    ///
    /// The referee argument is free-form input; when it is empty or names
    /// nobody registered the call fails without touching any record. Both
    /// records commit together or not at all. Self-referral is permitted and
    /// credits both rewards to the single record.
    pub async fn complete_referral(
        &self,
        referrer_id: &str,
        referee_id: &str,
    ) -> Result<ReferralReceipt, LedgerError> {
        // Registration is checked before the referral code, matching the
        // operation's error precedence. Records are never deleted, so a
        // positive answer cannot go stale before the guards are taken.
        if self.lookup(referrer_id).is_none() {
            return Err(LedgerError::NotRegistered(referrer_id.to_string()));
        }

        let referee_id = referee_id.trim();
        if referee_id.is_empty() {
            warn!(referrer = referrer_id, "empty referral code");
            return Err(LedgerError::InvalidReferralCode(referee_id.to_string()));
        }

        // Both guards taken in lexicographic order so two users referring
        // each other concurrently cannot deadlock.
        let (first, second) = if referrer_id <= referee_id {
            (referrer_id, referee_id)
        } else {
            (referee_id, referrer_id)
        };
        let first_guard = self.guard_for(first);
        let second_guard = (first != second).then(|| self.guard_for(second));

        let _serial_first = first_guard.lock().await;
        let _serial_second = match &second_guard {
            Some(guard) => Some(guard.lock().await),
            None => None,
        };

        let receipt = if referrer_id == referee_id {
            let mut record = self.committed(referrer_id)?;
            record.coins += 2 * REFERRAL_REWARD;
            record.referral_count += 1;
            let level_up = record.try_level_up();
            let receipt = ReferralReceipt {
                referrer_balance: record.coins,
                referee_balance: record.coins,
                referral_count: record.referral_count,
                level_up,
            };
            self.commit_records(
                vec![(referrer_id.to_string(), record)],
                (2 * REFERRAL_REWARD) as i64,
            )
            .await?;
            receipt
        } else {
            let mut referrer = self.committed(referrer_id)?;
            let mut referee = match self.lookup(referee_id) {
                Some(record) => record,
                None => {
                    warn!(
                        referrer = referrer_id,
                        referee = referee_id,
                        "referral code names no registered user"
                    );
                    return Err(LedgerError::InvalidReferralCode(referee_id.to_string()));
                }
            };
            referrer.coins += REFERRAL_REWARD;
            referrer.referral_count += 1;
            referee.coins += REFERRAL_REWARD;
            let level_up = referrer.try_level_up();
            let receipt = ReferralReceipt {
                referrer_balance: referrer.coins,
                referee_balance: referee.coins,
                referral_count: referrer.referral_count,
                level_up,
            };
            self.commit_records(
                vec![
                    (referrer_id.to_string(), referrer),
                    (referee_id.to_string(), referee),
                ],
                (2 * REFERRAL_REWARD) as i64,
            )
            .await?;
            receipt
        };

        if let Some(level_up) = &receipt.level_up {
            info!(
                user = referrer_id,
                level = level_up.level,
                badge = %level_up.badge,
                "level up"
            );
        }
        debug!(
            referrer = referrer_id,
            referee = referee_id,
            count = receipt.referral_count,
            "referral completed"
        );
        Ok(receipt)
    }

    /// Claim a one-time task reward.
    ///
    /// The task name is parsed against the closed task set; a task already
    /// claimed is reported without mutating anything.
    pub async fn complete_task(
        &self,
        user_id: &str,
        task_name: &str,
    ) -> Result<TaskReceipt, LedgerError> {
        let guard = self.guard_for(user_id);
        let _serial = guard.lock().await;

        // Registration is checked before the task name is parsed, matching
        // the operation's error precedence.
        let mut record = self.committed(user_id)?;
        let task: Task = task_name.parse().map_err(|err| {
            warn!(user = user_id, task = task_name, "unknown task claimed");
            LedgerError::InvalidTask(err)
        })?;
        if record.has_completed(task) {
            debug!(user = user_id, task = %task, "task already completed");
            return Err(LedgerError::TaskAlreadyCompleted(task));
        }
        record.completed_tasks.insert(task);
        record.coins += TASK_REWARD;
        let receipt = TaskReceipt {
            task,
            reward: TASK_REWARD,
            balance: record.coins,
        };
        self.commit_records(vec![(user_id.to_string(), record)], TASK_REWARD as i64)
            .await?;

        debug!(user = user_id, task = %task, balance = receipt.balance, "task completed");
        Ok(receipt)
    }

    /// Coins remaining in the distribution pool.
    pub fn total_supply(&self) -> i64 {
        self.supply.load(Ordering::SeqCst)
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Copy of the committed table.
    pub fn snapshot(&self) -> UserTable {
        self.read_table().clone()
    }

    /// Subscribe to post-commit events.
    pub fn subscribe(&self) -> broadcast::Receiver<LedgerEvent> {
        self.events.subscribe()
    }

    /// Persist the changed records, then make them visible.
    ///
    /// The snapshot sent to the store is the committed table with the changes
    /// applied; only a successful save mutates the table and debits the
    /// supply. On failure everything is discarded and the caller surfaces the
    /// storage error.
    async fn commit_records(
        &self,
        changes: Vec<(String, UserRecord)>,
        coins_created: i64,
    ) -> Result<(), LedgerError> {
        let _commit = self.commit.lock().await;

        let snapshot = {
            let table = self.read_table();
            let mut snapshot = table.clone();
            for (user_id, record) in &changes {
                snapshot.insert(user_id.clone(), record.clone());
            }
            snapshot
        };

        if let Err(err) = self.store.save(&snapshot).await {
            warn!(error = %err, "state save failed; discarding change");
            return Err(err.into());
        }

        {
            let mut table = self.write_table();
            for (user_id, record) in changes {
                table.insert(user_id, record);
            }
        }
        if coins_created != 0 {
            self.supply.fetch_sub(coins_created, Ordering::SeqCst);
        }
        Ok(())
    }

    /// Committed record for a registered user.
    fn committed(&self, user_id: &str) -> Result<UserRecord, LedgerError> {
        self.lookup(user_id)
            .ok_or_else(|| LedgerError::NotRegistered(user_id.to_string()))
    }

    fn lookup(&self, user_id: &str) -> Option<UserRecord> {
        let table = self.read_table();
        table.get(user_id).cloned()
    }

    fn guard_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut guards = self
            .guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guards.entry(user_id.to_string()).or_default().clone()
    }

    fn read_table(&self) -> RwLockReadGuard<'_, UserTable> {
        self.table.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_table(&self) -> RwLockWriteGuard<'_, UserTable> {
        self.table.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify_coin_earned(&self, user_id: &str, balance: u64) {
        if self.events.receiver_count() == 0 {
            return;
        }
        let _ = self.events.send(LedgerEvent::CoinEarned {
            user_id: user_id.to_string(),
            balance,
        });
    }
}
