//! Glowcast Wallet - Coin ledger consumer API
//!
//! The entry point for every internal subsystem that moves coins: wallet,
//! gift, game, and subscription flows all go through `WalletService`.
//! `WalletContext` wires the components together once at process start;
//! there are no ambient globals.

pub mod commands;
pub mod context;
pub mod error;
pub mod service;

pub use context::WalletContext;
pub use error::WalletError;
pub use service::{CallerContext, WalletService};
