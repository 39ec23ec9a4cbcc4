//! Wallet service errors

use glowcast_idempotency::GuardError;
use glowcast_ledger::{Direction, EntryType};
use glowcast_store::StoreError;
use thiserror::Error;

/// Errors at the consumer API boundary
#[derive(Error, Debug)]
pub enum WalletError {
    #[error("{entry_type} is not a {expected:?} type")]
    WrongDirection {
        entry_type: EntryType,
        expected: Direction,
    },

    /// The same caller key is still being processed - retry later, do not
    /// duplicate
    #[error("Operation with key '{key}' is still in flight")]
    OperationInFlight { key: String },

    /// A completed idempotency record points at an entry that no longer
    /// resolves - requires manual inspection
    #[error("Idempotency key '{key}' refers to unknown result '{result_ref}'")]
    DanglingResult { key: String, result_ref: String },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Guard(#[from] GuardError),
}
