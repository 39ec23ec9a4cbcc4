//! Ledger errors

use crate::entry::{EntryType, FundDestination, FundSource};
use glowcast_core::Coins;
use thiserror::Error;

/// Errors that can occur when validating or constructing entries
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("user_id cannot be empty")]
    EmptyUserId,

    #[error("{entry_type} entries must have a non-zero amount")]
    ZeroAmount { entry_type: EntryType },

    #[error("Failure records must have zero amount, got {amount}")]
    NonZeroFailureAmount { amount: Coins },

    #[error("Invalid flow for {entry_type}: {fund_source} -> {destination}")]
    InvalidFlow {
        entry_type: EntryType,
        fund_source: FundSource,
        destination: FundDestination,
    },

    #[error("Context '{context}' does not match entry type {entry_type}")]
    ContextMismatch {
        entry_type: EntryType,
        context: &'static str,
    },

    #[error("{entry_type} entries require an external payment id")]
    MissingExternalPaymentId { entry_type: EntryType },

    #[error("{entry_type} entries require a counterparty")]
    MissingCounterparty { entry_type: EntryType },
}
