//! Store errors

use crate::account::AccountError;
use crate::journal::JournalError;
use glowcast_core::{Coins, EntryId, UserId};
use glowcast_ledger::{ChainError, EntryStatus, LedgerError};
use thiserror::Error;

/// Errors from ledger store operations
#[derive(Error, Debug)]
pub enum StoreError {
    /// Bad draft shape - rejected before any write
    #[error(transparent)]
    Validation(#[from] LedgerError),

    /// A debit would drive the balance negative
    #[error("Insufficient balance for {user_id}: {available} available, {required} required")]
    InsufficientBalance {
        user_id: UserId,
        available: Coins,
        required: Coins,
    },

    /// Version race lost after all retry attempts
    #[error("Concurrent modification on {user_id} after {attempts} attempts")]
    ConcurrentModification { user_id: UserId, attempts: u32 },

    /// Chain verification failed - appends for this user are held for audit
    #[error("Ledger integrity violation for {user_id}")]
    IntegrityViolation {
        user_id: UserId,
        #[source]
        source: ChainError,
    },

    /// Balance continuity between consecutive chained entries is broken
    #[error(
        "Balance discontinuity for {user_id} at entry {entry_id}: expected {expected}, got {actual}"
    )]
    BalanceDiscontinuity {
        user_id: UserId,
        entry_id: EntryId,
        expected: Coins,
        actual: Coins,
    },

    /// User is held for manual audit after an integrity violation
    #[error("Appends for {user_id} are held pending audit")]
    AuditHold { user_id: UserId },

    #[error("Entry not found: {0}")]
    EntryNotFound(EntryId),

    #[error("Entry {entry_id} cannot transition from {from} to {to}")]
    InvalidTransition {
        entry_id: EntryId,
        from: EntryStatus,
        to: EntryStatus,
    },

    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Journal(#[from] JournalError),
}
