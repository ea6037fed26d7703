//! Reward schedule and supply constants.

/// Coins granted by a single earn claim.
pub const EARN_REWARD: u64 = 1;

/// Coins granted to each side of a successful referral.
pub const REFERRAL_REWARD: u64 = 5_000;

/// Coins granted for completing a one-time task.
pub const TASK_REWARD: u64 = 100_000;

/// Referral count at which a pending level-up becomes due.
pub const LEVEL_UP_REFERRALS: u64 = 10;

/// Highest level a user can reach.
pub const MAX_LEVEL: u32 = 10;

/// Coins available for distribution over the lifetime of the ledger.
///
/// Every coin credited to a user is debited from this pool, so at any point
/// `remaining supply + sum of all balances == INITIAL_SUPPLY`. Signed so the
/// remaining supply can legally run below zero once the pool is exhausted.
pub const INITIAL_SUPPLY: i64 = 3_000_000_000_454;
