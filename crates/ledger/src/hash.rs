//! Hash chain utilities for ledger integrity
//!
//! Each completed entry's hash incorporates the previous completed entry's
//! hash, giving every user a tamper-evident total order over their entries.

use crate::entry::LedgerEntry;
use glowcast_core::EntryId;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Sentinel previous-hash for a user's first completed entry
pub const GENESIS_HASH: &str = "GENESIS";

/// Calculate the SHA256 hash of an entry's chain fields.
///
/// Covers id, user, type, amount, creation time, and the previous hash -
/// the fields that fix an entry's place and effect in the chain.
pub fn calculate_entry_hash(entry: &LedgerEntry) -> String {
    let mut hasher = Sha256::new();

    hasher.update(entry.id.to_string().as_bytes());
    hasher.update(entry.user_id.as_str().as_bytes());
    hasher.update(entry.entry_type.to_string().as_bytes());
    hasher.update(entry.amount.value().to_le_bytes());
    hasher.update(entry.created_at.to_rfc3339().as_bytes());
    hasher.update(entry.previous_hash.as_bytes());

    hex::encode(hasher.finalize())
}

/// Errors in hash chain verification
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Broken link at entry {entry_id}: expected previous_hash '{expected}', got '{actual}'")]
    BrokenLink {
        entry_id: EntryId,
        expected: String,
        actual: String,
    },

    #[error("Invalid hash at entry {entry_id}: expected '{expected}', got '{actual}'")]
    InvalidHash {
        entry_id: EntryId,
        expected: String,
        actual: String,
    },
}

/// Verify the hash chain over one user's entries, in creation order.
///
/// Only chained entries (completed, or flagged after completion) are
/// checked; failed, cancelled, and pending entries never joined the chain.
/// Stops at the first mismatch and reports the offending entry id.
pub fn verify_chain(entries: &[LedgerEntry]) -> Result<(), ChainError> {
    let mut prev_hash = GENESIS_HASH.to_string();

    for entry in entries.iter().filter(|e| e.is_chained()) {
        if entry.previous_hash != prev_hash {
            return Err(ChainError::BrokenLink {
                entry_id: entry.id,
                expected: prev_hash,
                actual: entry.previous_hash.clone(),
            });
        }

        let calculated = calculate_entry_hash(entry);
        if entry.hash != calculated {
            return Err(ChainError::InvalidHash {
                entry_id: entry.id,
                expected: calculated,
                actual: entry.hash.clone(),
            });
        }

        prev_hash = entry.hash.clone();
    }

    Ok(())
}
