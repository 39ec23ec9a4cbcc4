//! Glowcast Store - Sole writer of ledger entries and balance accounts
//!
//! The store owns the only mutable shared state in the coin subsystem:
//! per-user `BalanceAccount` projections, the per-user completed-entry hash
//! chain, and the lookup indices. Every balance mutation happens inside the
//! same commit section that records the corresponding entry.
//!
//! Durability follows the journal-first model: an append-only JSONL journal
//! is the source of truth, and `LedgerStore::open` rebuilds all in-memory
//! state by replaying it.

pub mod account;
pub mod error;
pub mod journal;
pub mod store;

pub use account::{AccountError, BalanceAccount, BalanceSnapshot};
pub use error::StoreError;
pub use journal::{JournalError, JournalReader, LedgerJournal};
pub use store::{LedgerStore, StoreConfig};
