//! Webhook errors

use glowcast_idempotency::GuardError;
use glowcast_store::StoreError;
use thiserror::Error;

/// Errors from webhook ingestion
#[derive(Error, Debug)]
pub enum WebhookError {
    /// Envelope signature did not verify - rejected at the boundary
    #[error("Invalid envelope signature: {reason}")]
    InvalidSignature { reason: String },

    /// Required metadata missing or unusable - permanent rejection
    #[error("Malformed event metadata: {reason}")]
    MalformedMetadata { reason: String },

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
