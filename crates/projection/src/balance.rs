//! Balance view - per-user balances rebuilt from journal records

use crate::error::ProjectionError;
use glowcast_core::UserId;
use glowcast_ledger::{BalancePool, Direction, LedgerEntry};
use sqlx::{Row, SqlitePool};

/// Per-user balance view, keyed uniquely by user id
pub struct BalanceView {
    pool: SqlitePool,
}

/// One row of the balances table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRow {
    pub user_id: String,
    pub balance: i64,
    pub bonus_balance: i64,
    pub total_earned: i64,
    pub total_spent: i64,
}

impl BalanceView {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the schema
    pub async fn init(&self) -> Result<(), ProjectionError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS balances (
                user_id TEXT PRIMARY KEY,
                balance INTEGER NOT NULL DEFAULT 0,
                bonus_balance INTEGER NOT NULL DEFAULT 0,
                total_earned INTEGER NOT NULL DEFAULT 0,
                total_spent INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Apply one balance-affecting record
    pub async fn apply(&self, entry: &LedgerEntry) -> Result<(), ProjectionError> {
        let amount = entry.amount.value() as i64;
        let (delta, earned, spent) = match entry.entry_type.direction() {
            Direction::Credit => (amount, amount, 0i64),
            Direction::Debit => (-amount, 0i64, amount),
        };
        let (balance_delta, bonus_delta) = match entry.pool {
            BalancePool::Withdrawable => (delta, 0i64),
            BalancePool::Bonus => (0i64, delta),
        };

        sqlx::query(
            r#"
            INSERT INTO balances (user_id, balance, bonus_balance, total_earned, total_spent, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                balance = balance + excluded.balance,
                bonus_balance = bonus_balance + excluded.bonus_balance,
                total_earned = total_earned + excluded.total_earned,
                total_spent = total_spent + excluded.total_spent,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(entry.user_id.as_str())
        .bind(balance_delta)
        .bind(bonus_delta)
        .bind(earned)
        .bind(spent)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Balance row for a user, if any
    pub async fn get(&self, user_id: &UserId) -> Result<Option<BalanceRow>, ProjectionError> {
        let row = sqlx::query(
            "SELECT user_id, balance, bonus_balance, total_earned, total_spent
             FROM balances WHERE user_id = ?",
        )
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| BalanceRow {
            user_id: row.get("user_id"),
            balance: row.get("balance"),
            bonus_balance: row.get("bonus_balance"),
            total_earned: row.get("total_earned"),
            total_spent: row.get("total_spent"),
        }))
    }

    /// Clear all balances (for replay)
    pub async fn clear(&self) -> Result<(), ProjectionError> {
        sqlx::query("DELETE FROM balances")
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
