//! Glowcast Projection - Journal to SQLite query views
//!
//! Projections are DISPOSABLE - the JSONL journal is the source of truth
//! and any view can be rebuilt from it at any time. The views realize the
//! persisted query layout: balances keyed uniquely by user, entries
//! indexed by (user, created_at) and by external payment id.

pub mod balance;
pub mod engine;
pub mod error;
pub mod history;

pub use balance::BalanceView;
pub use engine::ProjectionEngine;
pub use error::ProjectionError;
pub use history::EntryHistoryView;
