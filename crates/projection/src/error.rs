//! Projection errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProjectionError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Journal error: {0}")]
    Journal(#[from] glowcast_store::JournalError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
