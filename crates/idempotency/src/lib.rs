//! Glowcast Idempotency - At-most-once execution keys
//!
//! The guard is attempted before any externally observable effect: a crash
//! between `begin` and `complete` leaves an in-flight placeholder that is
//! reclaimable after a staleness bound, so retries never double-execute and
//! a dead worker never blocks forever.

pub mod error;
pub mod guard;

pub use error::GuardError;
pub use guard::{Begin, IdempotencyGuard, KeyTtl};
