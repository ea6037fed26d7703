//! Post-commit event fanout.
//!
//! The ledger broadcasts an event after a mutation has been persisted and
//! committed, with every lock already released. The transport layer
//! subscribes to drive side effects (the earn celebration image); a slow or
//! absent subscriber never blocks an operation.

use tokio::sync::broadcast;

/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Event emitted after a committed mutation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerEvent {
    /// A user claimed their earn reward.
    CoinEarned { user_id: String, balance: u64 },
}

/// Create the broadcast channel the ledger emits events on.
pub(crate) fn channel() -> broadcast::Sender<LedgerEvent> {
    let (sender, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
    sender
}
