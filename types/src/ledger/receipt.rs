//! Receipts returned by ledger operations.
//!
//! Each mutating operation hands back a small value describing exactly what
//! changed, so callers can render a message without re-reading the ledger.

use crate::ledger::Task;
use serde::Serialize;

/// A level gained through referrals, with the badge that came with it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LevelUp {
    pub level: u32,
    pub badge: String,
}

/// Outcome of a registration attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Registration {
    /// The user's balance after the call.
    pub balance: u64,
    /// Whether a new record was created, or the user was already registered.
    pub created: bool,
}

/// Outcome of a successful referral.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReferralReceipt {
    /// Referrer's balance after both rewards were credited.
    pub referrer_balance: u64,
    /// Referee's balance after both rewards were credited.
    pub referee_balance: u64,
    /// Referrer's lifetime referral count after this referral.
    pub referral_count: u64,
    /// Level gained by the referrer, if this referral made one due.
    pub level_up: Option<LevelUp>,
}

/// Outcome of claiming a one-time task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TaskReceipt {
    /// The task that was claimed.
    pub task: Task,
    /// Coins credited for it.
    pub reward: u64,
    /// The user's balance after the credit.
    pub balance: u64,
}
