//! Entry history view - queryable entry records
//!
//! Indexed by (user_id, created_at) for chain traversal and by
//! external_payment_id for refund lookup. Status transitions re-project
//! the same entry id; the row is replaced, the `applied` flag records
//! whether its balance effect has already been counted.

use crate::error::ProjectionError;
use glowcast_core::UserId;
use glowcast_ledger::LedgerEntry;
use sqlx::{Row, SqlitePool};

/// Queryable view over all journal records
pub struct EntryHistoryView {
    pool: SqlitePool,
}

impl EntryHistoryView {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the schema
    pub async fn init(&self) -> Result<(), ProjectionError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entries (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                entry_type TEXT NOT NULL,
                amount INTEGER NOT NULL,
                status TEXT NOT NULL,
                pool TEXT NOT NULL,
                created_at TEXT NOT NULL,
                external_payment_id TEXT,
                applied INTEGER NOT NULL DEFAULT 0,
                entry_json TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_entries_user_created
            ON entries(user_id, created_at)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_entries_external_payment
            ON entries(external_payment_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Whether this entry's balance effect was already projected
    pub async fn is_applied(&self, entry: &LedgerEntry) -> Result<bool, ProjectionError> {
        let row = sqlx::query("SELECT applied FROM entries WHERE id = ?")
            .bind(entry.id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("applied") != 0).unwrap_or(false))
    }

    /// Upsert one record
    pub async fn apply(&self, entry: &LedgerEntry, applied: bool) -> Result<(), ProjectionError> {
        let entry_json = serde_json::to_string(entry)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO entries
                (id, user_id, entry_type, amount, status, pool, created_at,
                 external_payment_id, applied, entry_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.user_id.as_str())
        .bind(entry.entry_type.to_string())
        .bind(entry.amount.value() as i64)
        .bind(entry.status.to_string())
        .bind(entry.pool.to_string())
        .bind(entry.created_at.to_rfc3339())
        .bind(entry.external_payment_id.as_deref())
        .bind(applied as i64)
        .bind(entry_json)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// All entries for a user in creation order
    pub async fn for_user(&self, user_id: &UserId) -> Result<Vec<LedgerEntry>, ProjectionError> {
        let rows = sqlx::query(
            "SELECT entry_json FROM entries WHERE user_id = ? ORDER BY created_at, id",
        )
        .bind(user_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let json: String = row.get("entry_json");
                serde_json::from_str(&json).map_err(ProjectionError::from)
            })
            .collect()
    }

    /// Entry for a provider payment id, if projected
    pub async fn by_external_payment_id(
        &self,
        payment_id: &str,
    ) -> Result<Option<LedgerEntry>, ProjectionError> {
        let row = sqlx::query(
            "SELECT entry_json FROM entries WHERE external_payment_id = ?
             ORDER BY created_at LIMIT 1",
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let json: String = row.get("entry_json");
            serde_json::from_str(&json).map_err(ProjectionError::from)
        })
        .transpose()
    }

    /// Clear all entries (for replay)
    pub async fn clear(&self) -> Result<(), ProjectionError> {
        sqlx::query("DELETE FROM entries")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
