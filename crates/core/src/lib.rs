//! Glowcast Core - Domain types
//!
//! This crate contains the fundamental types used across Glowcast:
//! - `Coins`: Non-negative integral coin amount
//! - `UserId`: Identifier of a platform user
//! - `EntryId`: Identifier of a single ledger entry

pub mod coins;
pub mod ids;

pub use coins::Coins;
pub use ids::{EntryId, UserId};
