//! Glowcast Webhook - Idempotent ingestion of signed payment events
//!
//! Per inbound event: `RECEIVED -> (bad signature) REJECTED`,
//! `RECEIVED -> (valid, duplicate key) SKIPPED`,
//! `RECEIVED -> (valid, new key) PROCESSING -> {CREDITED | FAILED_RECORDED
//! | REFUNDED} -> COMPLETE`.
//!
//! Signature verification happens at the boundary; nothing unsigned ever
//! reaches the ledger. Every handled-or-skipped event yields an
//! acknowledgeable outcome so the payment processor stops retrying.

pub mod envelope;
pub mod error;
pub mod ingestor;

pub use envelope::{EventEnvelope, ProviderSigner, ProviderVerifier};
pub use error::WebhookError;
pub use ingestor::{IngestOutcome, PaymentWebhookIngestor};
