//! SQLite-backed idempotency keys
//!
//! One row per key. `begin` inserts an in-flight placeholder atomically;
//! a key that already exists is a duplicate and must not re-execute side
//! effects, even if the first attempt is still running. `complete` and
//! `release` close out success and failure.

use crate::error::GuardError;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// How long a never-completed placeholder blocks retries before it is
/// considered abandoned by a crashed worker.
const DEFAULT_STALE_AFTER_SECS: i64 = 300;

/// Expiry class of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// Payment-event keys never expire
    Permanent,
    /// Daily-claim keys expire at the next day boundary
    UntilEndOfDay,
}

impl KeyTtl {
    fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            KeyTtl::Permanent => None,
            KeyTtl::UntilEndOfDay => {
                let next_day = (now + Duration::days(1)).date_naive();
                Some(
                    next_day
                        .and_hms_opt(0, 0, 0)
                        .expect("midnight is a valid time")
                        .and_utc(),
                )
            }
        }
    }
}

/// Outcome of `begin`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Begin {
    /// Key inserted; the caller owns the side effect
    New,
    /// Key already taken. `result_ref` is the prior result if that attempt
    /// completed; `in_flight` means the first attempt may still be running
    /// and the caller must not duplicate it.
    Duplicate {
        result_ref: Option<String>,
        in_flight: bool,
    },
}

/// SQLite-backed idempotency guard
pub struct IdempotencyGuard {
    conn: Mutex<Connection>,
    stale_after: Duration,
}

impl IdempotencyGuard {
    /// Create a guard with the given database path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, GuardError> {
        let conn = Connection::open(path)?;
        Self::with_connection(conn)
    }

    /// Create an in-memory guard (for testing)
    pub fn in_memory() -> Result<Self, GuardError> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, GuardError> {
        let guard = Self {
            conn: Mutex::new(conn),
            stale_after: Duration::seconds(DEFAULT_STALE_AFTER_SECS),
        };
        guard.init_schema()?;
        Ok(guard)
    }

    /// Override the staleness bound (tests, ops tuning)
    pub fn with_staleness(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    fn init_schema(&self) -> Result<(), GuardError> {
        let conn = self.conn.lock().expect("guard lock poisoned");
        conn.execute(
            "CREATE TABLE IF NOT EXISTS idempotency_keys (
                key TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                result_ref TEXT,
                created_at TEXT NOT NULL,
                expires_at TEXT
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_idempotency_expires
             ON idempotency_keys(expires_at)",
            [],
        )?;

        Ok(())
    }

    /// Atomically insert an in-flight placeholder for `key`.
    ///
    /// Must be called before any externally observable effect. Expired keys
    /// are purged lazily here; stale in-flight placeholders are reclaimed.
    pub fn begin(&self, key: &str, ttl: KeyTtl) -> Result<Begin, GuardError> {
        let now = Utc::now();
        let conn = self.conn.lock().expect("guard lock poisoned");

        // Lazy purge of day-boundary keys
        conn.execute(
            "DELETE FROM idempotency_keys
             WHERE key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
            params![key, now.to_rfc3339()],
        )?;

        let inserted = conn.execute(
            "INSERT INTO idempotency_keys (key, state, result_ref, created_at, expires_at)
             VALUES (?1, 'in_flight', NULL, ?2, ?3)
             ON CONFLICT(key) DO NOTHING",
            params![
                key,
                now.to_rfc3339(),
                ttl.expires_at(now).map(|t| t.to_rfc3339()),
            ],
        )?;

        if inserted == 1 {
            return Ok(Begin::New);
        }

        let (state, result_ref, created_at): (String, Option<String>, String) = conn
            .query_row(
                "SELECT state, result_ref, created_at FROM idempotency_keys WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        if state == "in_flight" {
            let created = DateTime::parse_from_rfc3339(&created_at)
                .map(|t| t.with_timezone(&Utc))
                .unwrap_or(now);

            if now - created >= self.stale_after {
                // Abandoned by a crashed worker - take it over
                conn.execute(
                    "UPDATE idempotency_keys SET created_at = ?2 WHERE key = ?1",
                    params![key, now.to_rfc3339()],
                )?;
                tracing::warn!(key, "reclaimed stale idempotency placeholder");
                return Ok(Begin::New);
            }

            return Ok(Begin::Duplicate {
                result_ref: None,
                in_flight: true,
            });
        }

        Ok(Begin::Duplicate {
            result_ref,
            in_flight: false,
        })
    }

    /// Record the result of a successful operation
    pub fn complete(&self, key: &str, result_ref: &str) -> Result<(), GuardError> {
        let conn = self.conn.lock().expect("guard lock poisoned");
        let updated = conn.execute(
            "UPDATE idempotency_keys SET state = 'completed', result_ref = ?2 WHERE key = ?1",
            params![key, result_ref],
        )?;
        if updated == 0 {
            return Err(GuardError::NotFound(key.to_string()));
        }
        Ok(())
    }

    /// Drop the placeholder after a failed operation so a retry can
    /// re-execute.
    pub fn release(&self, key: &str) -> Result<(), GuardError> {
        let conn = self.conn.lock().expect("guard lock poisoned");
        conn.execute(
            "DELETE FROM idempotency_keys WHERE key = ?1",
            params![key],
        )?;
        Ok(())
    }

    /// Prior result for a key, if the operation completed
    pub fn result_of(&self, key: &str) -> Result<Option<String>, GuardError> {
        let conn = self.conn.lock().expect("guard lock poisoned");
        let result = conn
            .query_row(
                "SELECT result_ref FROM idempotency_keys
                 WHERE key = ?1 AND state = 'completed'",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(result)
    }

    #[cfg(test)]
    fn backdate(&self, key: &str, by: Duration) {
        let conn = self.conn.lock().unwrap();
        let then = (Utc::now() - by).to_rfc3339();
        conn.execute(
            "UPDATE idempotency_keys SET created_at = ?2 WHERE key = ?1",
            params![key, then],
        )
        .unwrap();
    }

    #[cfg(test)]
    fn expire_now(&self, key: &str) {
        let conn = self.conn.lock().unwrap();
        let then = (Utc::now() - Duration::seconds(1)).to_rfc3339();
        conn.execute(
            "UPDATE idempotency_keys SET expires_at = ?2 WHERE key = ?1",
            params![key, then],
        )
        .unwrap();
    }
}
