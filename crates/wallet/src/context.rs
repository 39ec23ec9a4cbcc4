//! Application context - wires everything together

use glowcast_fraud::{FraudConfig, ScoringService, VelocityScorer};
use glowcast_idempotency::IdempotencyGuard;
use glowcast_projection::ProjectionEngine;
use glowcast_store::{JournalReader, LedgerStore, StoreConfig};
use glowcast_webhook::{PaymentWebhookIngestor, ProviderVerifier};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// One process-wide wiring of the coin subsystem.
///
/// Constructed once at startup and passed by reference to collaborators;
/// components receive each other through `Arc`s, never through globals.
pub struct WalletContext {
    pub store: Arc<LedgerStore>,
    pub guard: Arc<IdempotencyGuard>,
    pub scorer: Arc<VelocityScorer>,
    pub scoring: Arc<ScoringService>,
    pub projection: Option<ProjectionEngine>,
    journal_path: PathBuf,
}

impl WalletContext {
    /// Open all components under one data directory, replaying the journal
    /// to rebuild store state and projections.
    pub async fn new(data_path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let data_path = data_path.as_ref();
        let journal_path = data_path.join("journal");
        std::fs::create_dir_all(&journal_path)?;

        let store = Arc::new(LedgerStore::open(&journal_path, StoreConfig::default())?);
        let guard = Arc::new(IdempotencyGuard::new(data_path.join("idempotency.db"))?);

        let fraud_config = FraudConfig::default();
        let budget = Duration::from_millis(fraud_config.score_timeout_ms);
        let scorer = Arc::new(VelocityScorer::new(fraud_config));
        let scoring = Arc::new(ScoringService::new(
            Arc::clone(&scorer) as Arc<dyn glowcast_fraud::FraudScorer>,
            budget,
        ));

        // Projections are best-effort query views; the store is
        // authoritative either way
        let projection = ProjectionEngine::new(data_path.join("projection.db"))
            .await
            .ok();
        if let Some(ref projection) = projection {
            let reader = JournalReader::from_directory(&journal_path)?;
            if let Err(err) = projection.replay(&reader).await {
                tracing::warn!(error = %err, "projection replay failed, views are stale");
            }
        }

        Ok(Self {
            store,
            guard,
            scorer,
            scoring,
            projection,
            journal_path,
        })
    }

    /// Fully in-memory context (tests, tooling) - no journal, no
    /// projection database.
    pub fn ephemeral() -> Result<Self, anyhow::Error> {
        let fraud_config = FraudConfig::default();
        let budget = Duration::from_millis(fraud_config.score_timeout_ms);
        let scorer = Arc::new(VelocityScorer::new(fraud_config));

        Ok(Self {
            store: Arc::new(LedgerStore::ephemeral(StoreConfig::default())),
            guard: Arc::new(IdempotencyGuard::in_memory()?),
            scoring: Arc::new(ScoringService::new(
                Arc::clone(&scorer) as Arc<dyn glowcast_fraud::FraudScorer>,
                budget,
            )),
            scorer,
            projection: None,
            journal_path: PathBuf::new(),
        })
    }

    /// Build the payment webhook ingestor against this context
    pub fn webhook_ingestor(&self, verifier: ProviderVerifier) -> PaymentWebhookIngestor {
        PaymentWebhookIngestor::new(
            verifier,
            Arc::clone(&self.store),
            Arc::clone(&self.guard),
            Arc::clone(&self.scoring),
        )
    }

    pub fn journal_path(&self) -> &Path {
        &self.journal_path
    }
}
