use crate::store::StoreError;
use punchcoin_types::{Task, UnknownTask};
use thiserror::Error;

/// Error type for ledger operations.
///
/// Every variant is recoverable: a failed operation leaves the ledger
/// unchanged and the service keeps serving.
#[derive(Error, Debug)]
pub enum LedgerError {
    /// The user has no record; they must register first.
    #[error("user {0:?} is not registered")]
    NotRegistered(String),

    /// The referral argument was empty or named no registered user.
    #[error("invalid referral code {0:?}")]
    InvalidReferralCode(String),

    /// The task name is not in the claimable set.
    #[error(transparent)]
    InvalidTask(#[from] UnknownTask),

    /// The user already claimed this task.
    #[error("task {0} already completed")]
    TaskAlreadyCompleted(Task),

    /// The backing store failed; the attempted change was discarded.
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}
