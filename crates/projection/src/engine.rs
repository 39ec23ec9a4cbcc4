//! Projection engine - coordinates replay and per-record updates

use crate::balance::BalanceView;
use crate::error::ProjectionError;
use crate::history::EntryHistoryView;
use glowcast_ledger::LedgerEntry;
use glowcast_store::JournalReader;
use sqlx::SqlitePool;
use std::path::Path;

/// Coordinates the SQLite views over one database
pub struct ProjectionEngine {
    balances: BalanceView,
    entries: EntryHistoryView,
}

impl ProjectionEngine {
    /// Open (or create) the projection database
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, ProjectionError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePool::connect(&db_url).await?;
        Self::with_pool(pool).await
    }

    /// In-memory projection (for testing)
    pub async fn in_memory() -> Result<Self, ProjectionError> {
        let pool = SqlitePool::connect("sqlite::memory:").await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, ProjectionError> {
        let balances = BalanceView::new(pool.clone());
        let entries = EntryHistoryView::new(pool);
        balances.init().await?;
        entries.init().await?;

        Ok(Self { balances, entries })
    }

    /// Apply a single journal record.
    ///
    /// The balance arithmetic runs once per entry - the first time the
    /// record arrives carrying its balance effect. Later re-projections of
    /// the same id (review transitions) only replace the entry row.
    pub async fn apply(&self, entry: &LedgerEntry) -> Result<(), ProjectionError> {
        let already_applied = self.entries.is_applied(entry).await?;
        let applies_now = entry.is_chained() && !already_applied;

        if applies_now {
            self.balances.apply(entry).await?;
        }
        self.entries
            .apply(entry, already_applied || applies_now)
            .await?;

        Ok(())
    }

    /// Rebuild both views from the journal
    pub async fn replay(&self, reader: &JournalReader) -> Result<usize, ProjectionError> {
        let records = reader.read_all()?;

        self.balances.clear().await?;
        self.entries.clear().await?;

        for record in &records {
            self.apply(record).await?;
        }

        tracing::info!(records = records.len(), "projection replayed");
        Ok(records.len())
    }

    pub fn balances(&self) -> &BalanceView {
        &self.balances
    }

    pub fn entries(&self) -> &EntryHistoryView {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glowcast_core::{Coins, UserId};
    use glowcast_ledger::{EntryContext, EntryDraft, EntryStatus, EntryType};
    use glowcast_store::{LedgerStore, StoreConfig};

    fn purchase(user: &str, amount: u64, payment_id: &str) -> EntryDraft {
        EntryDraft::new(
            user,
            EntryType::Purchase,
            Coins::new(amount),
            EntryContext::Purchase {
                payment_id: payment_id.to_string(),
                payment_gateway: "stripe".to_string(),
            },
        )
        .external_payment_id(payment_id)
    }

    #[tokio::test]
    async fn test_apply_mirrors_store_balances() {
        let store = LedgerStore::ephemeral(StoreConfig::default());
        let projection = ProjectionEngine::in_memory().await.unwrap();

        let e1 = store.append(purchase("alice", 1000, "pay_1")).unwrap();
        let e2 = store
            .append(
                EntryDraft::new(
                    "alice",
                    EntryType::GiftSent,
                    Coins::new(300),
                    EntryContext::Gift {
                        gift_id: "rose".to_string(),
                        stream_id: None,
                    },
                )
                .counterparty("bob"),
            )
            .unwrap();

        projection.apply(&e1).await.unwrap();
        projection.apply(&e2).await.unwrap();

        let row = projection
            .balances()
            .get(&UserId::new("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.balance, 700);
        assert_eq!(row.total_earned, 1000);
        assert_eq!(row.total_spent, 300);
    }

    #[tokio::test]
    async fn test_reapplied_record_counts_once() {
        let store = LedgerStore::ephemeral(StoreConfig::default());
        let projection = ProjectionEngine::in_memory().await.unwrap();

        let entry = store.append(purchase("alice", 1000, "pay_1")).unwrap();
        projection.apply(&entry).await.unwrap();

        // A review transition re-projects the same id
        let flagged = store.flag_completed(entry.id).unwrap();
        projection.apply(&flagged).await.unwrap();

        let row = projection
            .balances()
            .get(&UserId::new("alice"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.balance, 1000);

        let entries = projection
            .entries()
            .for_user(&UserId::new("alice"))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, EntryStatus::Flagged);
    }

    #[tokio::test]
    async fn test_replay_from_journal() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
            store.append(purchase("alice", 1000, "pay_1")).unwrap();
            store.append(purchase("bob", 250, "pay_2")).unwrap();
        }

        let projection = ProjectionEngine::in_memory().await.unwrap();
        let reader = JournalReader::from_directory(dir.path()).unwrap();
        let applied = projection.replay(&reader).await.unwrap();
        assert_eq!(applied, 2);

        let row = projection
            .balances()
            .get(&UserId::new("bob"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(row.balance, 250);

        let found = projection
            .entries()
            .by_external_payment_id("pay_1")
            .await
            .unwrap();
        assert!(found.is_some());
    }
}
