//! Fraud scorer errors

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FraudError {
    #[error("Fraud check failed: {0}")]
    CheckFailed(String),
}
