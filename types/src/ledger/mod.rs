//! Ledger domain types.
//!
//! User records and the table they live in, the closed set of claimable tasks,
//! the reward schedule, and the receipts handed back by ledger operations.

mod constants;
mod receipt;
mod record;
mod task;

pub use constants::*;
pub use receipt::*;
pub use record::*;
pub use task::*;
