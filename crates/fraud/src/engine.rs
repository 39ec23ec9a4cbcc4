//! Fraud scorer and the fail-open scoring service

use crate::config::FraudConfig;
use crate::error::FraudError;
use crate::state::{FraudSignal, VelocityState};
use async_trait::async_trait;
use chrono::Utc;
use glowcast_core::{Coins, UserId};
use glowcast_ledger::{EntryType, RiskLevel};
use std::sync::{Arc, RwLock};
use std::time::Duration;

/// Contextual signals for scoring one draft
#[derive(Debug, Clone)]
pub struct ScoreContext {
    pub user_id: UserId,
    pub entry_type: EntryType,
    pub amount: Coins,
    pub ip: Option<String>,
    pub device_fingerprint: Option<String>,
    pub declared_country: Option<String>,
    pub ip_country: Option<String>,
}

impl ScoreContext {
    pub fn new(user_id: impl Into<UserId>, entry_type: EntryType, amount: Coins) -> Self {
        Self {
            user_id: user_id.into(),
            entry_type,
            amount,
            ip: None,
            device_fingerprint: None,
            declared_country: None,
            ip_country: None,
        }
    }
}

/// Result of scoring one draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    /// Weighted score 0-100
    pub fraud_score: u8,
    pub risk_level: RiskLevel,
    /// Names of the checks that fired
    pub rules_triggered: Vec<String>,
}

impl Assessment {
    /// Conservative default used when the scorer times out or errors
    pub fn fail_open() -> Self {
        Self {
            fraud_score: 50,
            risk_level: RiskLevel::Medium,
            rules_triggered: vec!["FAIL_OPEN".to_string()],
        }
    }
}

/// Scoring seam. The production implementation is [`VelocityScorer`];
/// tests substitute slow or failing scorers to exercise the fail-open
/// path.
#[async_trait]
pub trait FraudScorer: Send + Sync {
    async fn score(&self, ctx: &ScoreContext) -> Result<Assessment, FraudError>;
}

/// Weighted static + velocity scorer over the 24-hour window
pub struct VelocityScorer {
    config: FraudConfig,
    state: RwLock<VelocityState>,
}

impl VelocityScorer {
    pub fn new(config: FraudConfig) -> Self {
        Self {
            config,
            state: RwLock::new(VelocityState::new()),
        }
    }

    pub fn config(&self) -> &FraudConfig {
        &self.config
    }

    /// Update the velocity window from a committed entry. Called after the
    /// ledger write; the window is never consulted and mutated for the
    /// same draft.
    pub fn record(&self, ctx: &ScoreContext, fraud_score: u8) {
        let mut state = self.state.write().expect("velocity lock poisoned");
        state.record_at(
            &ctx.user_id,
            ctx.ip.as_deref(),
            ctx.device_fingerprint.as_deref(),
            fraud_score,
            Utc::now(),
        );
    }

    /// Read-model snapshot used as scoring input
    pub fn signal(&self, user_id: &UserId) -> FraudSignal {
        let mut state = self.state.write().expect("velocity lock poisoned");
        state.snapshot_at(user_id, Utc::now())
    }

    fn evaluate(&self, ctx: &ScoreContext, signal: &FraudSignal) -> Assessment {
        let config = &self.config;
        let mut score = 0u32;
        let mut rules_triggered = Vec::new();

        if let (Some(declared), Some(resolved)) = (&ctx.declared_country, &ctx.ip_country) {
            if !declared.eq_ignore_ascii_case(resolved) {
                score += u32::from(config.country_mismatch_weight);
                rules_triggered.push("COUNTRY_MISMATCH".to_string());
            }
        }

        if signal.tx_count_24h >= config.velocity_tx_threshold {
            score += u32::from(config.velocity_tx_weight);
            rules_triggered.push("VELOCITY_TX_COUNT".to_string());
        }

        if signal.unique_ips_24h >= config.velocity_ip_threshold {
            score += u32::from(config.velocity_ip_weight);
            rules_triggered.push("VELOCITY_UNIQUE_IPS".to_string());
        }

        if signal.unique_devices_24h >= config.velocity_device_threshold {
            score += u32::from(config.velocity_device_weight);
            rules_triggered.push("VELOCITY_UNIQUE_DEVICES".to_string());
        }

        if ctx.amount.value() >= config.large_amount_threshold {
            score += u32::from(config.large_amount_weight);
            rules_triggered.push("LARGE_AMOUNT".to_string());
        }

        let fraud_score = score.min(100) as u8;
        Assessment {
            fraud_score,
            risk_level: config.band(fraud_score),
            rules_triggered,
        }
    }
}

#[async_trait]
impl FraudScorer for VelocityScorer {
    async fn score(&self, ctx: &ScoreContext) -> Result<Assessment, FraudError> {
        let signal = self.signal(&ctx.user_id);
        Ok(self.evaluate(ctx, &signal))
    }
}

/// Wraps a scorer with the hard latency budget.
///
/// `assess` never fails and never blocks past the budget: a timeout or
/// scorer error yields the fail-open assessment and an independently
/// alertable log event.
pub struct ScoringService {
    scorer: Arc<dyn FraudScorer>,
    budget: Duration,
}

impl ScoringService {
    pub fn new(scorer: Arc<dyn FraudScorer>, budget: Duration) -> Self {
        Self { scorer, budget }
    }

    pub async fn assess(&self, ctx: &ScoreContext) -> Assessment {
        match tokio::time::timeout(self.budget, self.scorer.score(ctx)).await {
            Ok(Ok(assessment)) => assessment,
            Ok(Err(err)) => {
                tracing::error!(
                    target: "fraud_alert",
                    user_id = %ctx.user_id,
                    error = %err,
                    "fraud scorer failed, failing open to medium"
                );
                Assessment::fail_open()
            }
            Err(_) => {
                tracing::error!(
                    target: "fraud_alert",
                    user_id = %ctx.user_id,
                    budget_ms = self.budget.as_millis() as u64,
                    "fraud scorer timed out, failing open to medium"
                );
                Assessment::fail_open()
            }
        }
    }
}
