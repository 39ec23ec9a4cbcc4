//! Glowcast Ledger - Hash-chained coin entry model
//!
//! This is the HEART of Glowcast's coin economy. Every balance-affecting
//! event becomes exactly one immutable `LedgerEntry`.
//!
//! # Key Types
//! - `LedgerEntry`: One immutable record of a single economic event
//! - `EntryDraft`: Caller-supplied input, validated before commit
//! - `EntryType`: Economic event kind with its sign convention
//! - `EntryContext`: Tagged union of type-specific context fields
//! - `RiskLevel`: Ordered fraud-risk band attached to scored entries

pub mod entry;
pub mod error;
pub mod hash;
pub mod validation;

pub use entry::{
    BalancePool, Direction, Disposition, EntryContext, EntryDraft, EntryStatus, EntryType,
    FundDestination, FundSource, LedgerEntry, RiskLevel,
};
pub use error::LedgerError;
pub use hash::{calculate_entry_hash, verify_chain, ChainError, GENESIS_HASH};
pub use validation::validate_draft;
