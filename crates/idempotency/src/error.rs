//! Idempotency guard errors

use thiserror::Error;

/// Errors from the idempotency guard
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Idempotency key not found: {0}")]
    NotFound(String),
}
