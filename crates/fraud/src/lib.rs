//! Glowcast Fraud - Risk scoring for ledger drafts
//!
//! The scorer combines static checks (country mismatch, large amounts)
//! with velocity signals over a trailing 24-hour window into a weighted
//! 0-100 score, banded to a `RiskLevel`. High and critical bands force the
//! resulting entry to `Flagged` and withhold its balance effect.
//!
//! Scoring has a bounded latency budget and fails OPEN to `Medium`: a slow
//! or broken scorer must never stall legitimate processing.

pub mod config;
pub mod engine;
pub mod error;
pub mod state;

pub use config::FraudConfig;
pub use engine::{Assessment, FraudScorer, ScoreContext, ScoringService, VelocityScorer};
pub use error::FraudError;
pub use state::{FraudSignal, VelocityState};
