//! Common types for the punchcoin ledger.
//!
//! This crate defines the plain-data vocabulary shared by the ledger service and
//! anything that talks to it: user records, the claimable task set, reward
//! constants, and the receipts returned by ledger operations. It deliberately
//! contains no I/O and no locking so that every consumer agrees on one
//! serialization of the state.

pub mod ledger;

pub use ledger::{
    LevelUp, RecordError, ReferralReceipt, Registration, Task, TaskReceipt, UnknownTask,
    UserRecord, UserTable, EARN_REWARD, INITIAL_SUPPLY, LEVEL_UP_REFERRALS, MAX_LEVEL,
    REFERRAL_REWARD, TASK_REWARD,
};
