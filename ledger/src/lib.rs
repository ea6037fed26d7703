//! Punch coin ledger.
//!
//! This crate contains the concurrent ledger service behind the chat-facing
//! punch coin economy: registration, the earn claim, referrals with the
//! level/badge ladder, one-time task rewards, and the global supply counter.
//!
//! ## Consistency requirements
//! - Operations touching one record are serialized per user; different users
//!   proceed in parallel.
//! - A mutation becomes visible only after it has been persisted. A storage
//!   failure discards the attempted change entirely.
//! - Referrals mutate two records atomically, taking both user guards in
//!   lexicographic order so opposing referrals cannot deadlock.
//!
//! The primary entrypoint is [`Ledger`], generic over the [`Store`] that
//! holds the persisted user table.

pub mod error;
pub mod notify;
pub mod service;
pub mod store;

#[cfg(test)]
mod concurrency_tests;

pub use error::LedgerError;
pub use notify::{LedgerEvent, DEFAULT_EVENT_CAPACITY};
pub use service::Ledger;
pub use store::{JsonStore, Store, StoreError};

#[cfg(any(test, feature = "mocks"))]
pub use store::Memory;
