//! Payment event ingestion
//!
//! The ingestor drives the store through the idempotency guard: the guard
//! is taken before any observable effect, so a crash between `begin` and
//! `complete` can never double-credit on the provider's redelivery.

use crate::envelope::{EventEnvelope, ProviderVerifier};
use crate::error::WebhookError;
use glowcast_core::{Coins, EntryId, UserId};
use glowcast_fraud::{ScoreContext, ScoringService};
use glowcast_idempotency::{Begin, IdempotencyGuard, KeyTtl};
use glowcast_ledger::{Disposition, EntryContext, EntryDraft, EntryStatus, EntryType};
use glowcast_store::{LedgerStore, StoreError};
use serde_json::Value;
use std::sync::Arc;

/// Event types the ingestor understands
const PURCHASE_COMPLETED: &str = "checkout.session.completed";
const PAYMENT_FAILED: &str = "payment.failed";
const CHARGE_REFUNDED: &str = "charge.refunded";

/// Attempts at a refund whose covering balance keeps moving
const REFUND_ATTEMPTS: u32 = 3;

/// Terminal outcome for one inbound event. Every variant is
/// acknowledgeable; only a signature failure surfaces as an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Permanently rejected (malformed metadata, unknown type). Logged and
    /// acknowledged - there is nothing valid to credit.
    Rejected { reason: String },
    /// Duplicate delivery - the prior result stands
    Skipped { result_ref: Option<String> },
    /// Coins credited
    Credited { entry_id: EntryId },
    /// Credit written but flagged for review - no balance effect yet
    HeldForReview { entry_id: EntryId },
    /// Zero-amount failure entry recorded for audit
    FailureRecorded { entry_id: EntryId },
    /// Purchase reversed; `flagged` when the balance could not fully cover
    /// the reversal
    Refunded {
        entry_id: EntryId,
        flagged: bool,
        shortfall: Coins,
    },
}

/// Verified, deduplicated ingestion of provider payment events
pub struct PaymentWebhookIngestor {
    verifier: ProviderVerifier,
    store: Arc<LedgerStore>,
    guard: Arc<IdempotencyGuard>,
    scoring: Arc<ScoringService>,
}

impl PaymentWebhookIngestor {
    pub fn new(
        verifier: ProviderVerifier,
        store: Arc<LedgerStore>,
        guard: Arc<IdempotencyGuard>,
        scoring: Arc<ScoringService>,
    ) -> Self {
        Self {
            verifier,
            store,
            guard,
            scoring,
        }
    }

    /// Handle one inbound event envelope.
    ///
    /// Signature failure is the only hard error; everything else resolves
    /// to an acknowledgeable outcome.
    pub async fn handle(&self, envelope: &EventEnvelope) -> Result<IngestOutcome, WebhookError> {
        self.verifier.verify(envelope)?;

        match envelope.event_type.as_str() {
            PURCHASE_COMPLETED => self.handle_purchase_completed(envelope).await,
            PAYMENT_FAILED => self.handle_payment_failed(envelope),
            CHARGE_REFUNDED => self.handle_charge_refunded(envelope),
            other => {
                tracing::warn!(
                    event_id = %envelope.event_id,
                    event_type = other,
                    "unhandled payment event type"
                );
                Ok(IngestOutcome::Rejected {
                    reason: format!("unhandled event type: {}", other),
                })
            }
        }
    }

    async fn handle_purchase_completed(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<IngestOutcome, WebhookError> {
        let meta = match PurchaseMeta::extract(&envelope.payload) {
            Ok(meta) => meta,
            Err(err) => return Ok(self.reject(envelope, err)),
        };

        // Dedupe on the provider's checkout session - permanent key
        match self.guard.begin(&meta.session_id, KeyTtl::Permanent)? {
            Begin::Duplicate { result_ref, .. } => {
                tracing::info!(
                    event_id = %envelope.event_id,
                    session_id = %meta.session_id,
                    "duplicate purchase event skipped"
                );
                return Ok(IngestOutcome::Skipped { result_ref });
            }
            Begin::New => {}
        }

        let mut score_ctx =
            ScoreContext::new(meta.user_id.clone(), EntryType::Purchase, meta.coins_amount);
        score_ctx.ip = meta.ip.clone();
        score_ctx.device_fingerprint = meta.device_fingerprint.clone();
        score_ctx.declared_country = meta.declared_country.clone();
        score_ctx.ip_country = meta.ip_country.clone();
        let assessment = self.scoring.assess(&score_ctx).await;

        let draft = EntryDraft::new(
            meta.user_id.clone(),
            EntryType::Purchase,
            meta.coins_amount,
            EntryContext::Purchase {
                payment_id: meta.payment_id.clone(),
                payment_gateway: meta.payment_gateway.clone(),
            },
        )
        .scored(assessment.fraud_score, assessment.risk_level)
        .idempotency_key(meta.session_id.clone())
        .external_payment_id(meta.payment_id.clone());

        let entry = match self.store.append(draft) {
            Ok(entry) => entry,
            Err(err) => {
                // Leave the event retryable - the effect did not happen
                self.guard.release(&meta.session_id)?;
                return Err(err.into());
            }
        };

        self.guard.complete(&meta.session_id, &entry.id.to_string())?;

        if entry.status == EntryStatus::Flagged {
            tracing::warn!(
                target: "fraud_alert",
                entry_id = %entry.id,
                user_id = %entry.user_id,
                score = assessment.fraud_score,
                "purchase held for review"
            );
            return Ok(IngestOutcome::HeldForReview { entry_id: entry.id });
        }

        tracing::info!(
            entry_id = %entry.id,
            user_id = %entry.user_id,
            amount = %entry.amount,
            "purchase credited"
        );
        Ok(IngestOutcome::Credited { entry_id: entry.id })
    }

    /// A failed payment touches no balance; a zero-amount `Failed` entry
    /// keeps the attempt visible to audit.
    fn handle_payment_failed(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<IngestOutcome, WebhookError> {
        let meta = match FailureMeta::extract(&envelope.payload) {
            Ok(meta) => meta,
            Err(err) => return Ok(self.reject(envelope, err)),
        };

        let key = format!("failed:{}", envelope.event_id);
        match self.guard.begin(&key, KeyTtl::Permanent)? {
            Begin::Duplicate { result_ref, .. } => {
                return Ok(IngestOutcome::Skipped { result_ref });
            }
            Begin::New => {}
        }

        let draft = EntryDraft::new(
            meta.user_id,
            EntryType::Purchase,
            Coins::ZERO,
            EntryContext::Purchase {
                payment_id: meta.payment_id.clone(),
                payment_gateway: meta.payment_gateway,
            },
        )
        .disposition(Disposition::RecordFailure)
        .idempotency_key(key.clone())
        .external_payment_id(meta.payment_id);

        let entry = match self.store.append(draft) {
            Ok(entry) => entry,
            Err(err) => {
                self.guard.release(&key)?;
                return Err(err.into());
            }
        };

        self.guard.complete(&key, &entry.id.to_string())?;
        Ok(IngestOutcome::FailureRecorded { entry_id: entry.id })
    }

    /// Reverse a completed purchase. The reversal debits
    /// `min(original, current balance)`; an uncovered remainder flags the
    /// entry with a recorded shortfall and clamps the balance at zero.
    fn handle_charge_refunded(
        &self,
        envelope: &EventEnvelope,
    ) -> Result<IngestOutcome, WebhookError> {
        let meta = match RefundMeta::extract(&envelope.payload) {
            Ok(meta) => meta,
            Err(err) => return Ok(self.reject(envelope, err)),
        };

        let original = match self.store.find_by_external_payment_id(&meta.payment_id) {
            Some(entry) => entry,
            None => {
                return Ok(self.reject(
                    envelope,
                    WebhookError::MalformedMetadata {
                        reason: format!("no completed purchase for payment {}", meta.payment_id),
                    },
                ))
            }
        };

        let key = format!("refund:{}", meta.payment_id);
        match self.guard.begin(&key, KeyTtl::Permanent)? {
            Begin::Duplicate { result_ref, .. } => {
                return Ok(IngestOutcome::Skipped { result_ref });
            }
            Begin::New => {}
        }

        match self.reverse_purchase(&original.user_id, &original, &key) {
            Ok(outcome) => {
                if let IngestOutcome::Refunded {
                    entry_id,
                    flagged: true,
                    shortfall,
                } = &outcome
                {
                    tracing::warn!(
                        target: "audit",
                        entry_id = %entry_id,
                        user_id = %original.user_id,
                        shortfall = %shortfall,
                        "refund not fully covered, queued for manual review"
                    );
                }
                Ok(outcome)
            }
            Err(err) => {
                self.guard.release(&key)?;
                Err(err)
            }
        }
    }

    fn reverse_purchase(
        &self,
        user_id: &UserId,
        original: &glowcast_ledger::LedgerEntry,
        key: &str,
    ) -> Result<IngestOutcome, WebhookError> {
        let mut attempt = 0;
        loop {
            attempt += 1;

            // The covering balance is re-read every attempt: a concurrent
            // spend between the read and the append shrinks what the
            // reversal can recover.
            let balance = self.store.get_balance(user_id).balance;
            let refund_amount = original.amount.min(balance);
            let shortfall = original.amount.saturating_sub(refund_amount);

            let disposition = if shortfall.is_zero() {
                Disposition::Settle
            } else {
                Disposition::SettleFlagged
            };

            let draft = EntryDraft::new(
                user_id.clone(),
                EntryType::Refund,
                refund_amount,
                EntryContext::Refund {
                    original_entry_id: original.id,
                    shortfall,
                },
            )
            .disposition(disposition)
            .idempotency_key(key.to_string())
            .external_payment_id(
                original
                    .external_payment_id
                    .clone()
                    .unwrap_or_default(),
            );

            match self.store.append(draft) {
                Ok(entry) => {
                    self.guard.complete(key, &entry.id.to_string())?;
                    return Ok(IngestOutcome::Refunded {
                        entry_id: entry.id,
                        flagged: !shortfall.is_zero(),
                        shortfall,
                    });
                }
                Err(
                    StoreError::InsufficientBalance { .. }
                    | StoreError::ConcurrentModification { .. },
                ) if attempt < REFUND_ATTEMPTS => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn reject(&self, envelope: &EventEnvelope, err: WebhookError) -> IngestOutcome {
        tracing::warn!(
            event_id = %envelope.event_id,
            event_type = %envelope.event_type,
            error = %err,
            "payment event permanently rejected"
        );
        IngestOutcome::Rejected {
            reason: err.to_string(),
        }
    }
}

// === payload metadata extraction ===

struct PurchaseMeta {
    user_id: UserId,
    session_id: String,
    payment_id: String,
    payment_gateway: String,
    coins_amount: Coins,
    ip: Option<String>,
    device_fingerprint: Option<String>,
    declared_country: Option<String>,
    ip_country: Option<String>,
}

impl PurchaseMeta {
    fn extract(payload: &Value) -> Result<Self, WebhookError> {
        Ok(Self {
            user_id: UserId::new(required_str(payload, "user_id")?),
            session_id: required_str(payload, "session_id")?.to_string(),
            payment_id: required_str(payload, "payment_id")?.to_string(),
            payment_gateway: optional_str(payload, "payment_gateway")
                .unwrap_or("card")
                .to_string(),
            coins_amount: Coins::new(required_u64(payload, "coins_amount")?),
            ip: optional_str(payload, "ip").map(str::to_string),
            device_fingerprint: optional_str(payload, "device_fingerprint").map(str::to_string),
            declared_country: optional_str(payload, "declared_country").map(str::to_string),
            ip_country: optional_str(payload, "ip_country").map(str::to_string),
        })
    }
}

struct FailureMeta {
    user_id: UserId,
    payment_id: String,
    payment_gateway: String,
}

impl FailureMeta {
    fn extract(payload: &Value) -> Result<Self, WebhookError> {
        Ok(Self {
            user_id: UserId::new(required_str(payload, "user_id")?),
            payment_id: required_str(payload, "payment_id")?.to_string(),
            payment_gateway: optional_str(payload, "payment_gateway")
                .unwrap_or("card")
                .to_string(),
        })
    }
}

struct RefundMeta {
    payment_id: String,
}

impl RefundMeta {
    fn extract(payload: &Value) -> Result<Self, WebhookError> {
        Ok(Self {
            payment_id: required_str(payload, "payment_id")?.to_string(),
        })
    }
}

fn required_str<'a>(payload: &'a Value, field: &str) -> Result<&'a str, WebhookError> {
    payload
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| WebhookError::MalformedMetadata {
            reason: format!("missing field: {}", field),
        })
}

fn optional_str<'a>(payload: &'a Value, field: &str) -> Option<&'a str> {
    payload.get(field).and_then(Value::as_str)
}

fn required_u64(payload: &Value, field: &str) -> Result<u64, WebhookError> {
    payload
        .get(field)
        .and_then(Value::as_u64)
        .ok_or_else(|| WebhookError::MalformedMetadata {
            reason: format!("missing field: {}", field),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ProviderSigner;
    use glowcast_fraud::{FraudConfig, VelocityScorer};
    use glowcast_store::StoreConfig;
    use serde_json::json;
    use std::time::Duration;

    struct Fixture {
        signer: ProviderSigner,
        store: Arc<LedgerStore>,
        ingestor: PaymentWebhookIngestor,
    }

    fn fixture() -> Fixture {
        let signer = ProviderSigner::generate();
        let verifier = ProviderVerifier::from_hex("payprov", &signer.public_key_hex()).unwrap();
        let store = Arc::new(LedgerStore::ephemeral(StoreConfig::default()));
        let guard = Arc::new(IdempotencyGuard::in_memory().unwrap());
        let scorer = Arc::new(VelocityScorer::new(FraudConfig::default()));
        let scoring = Arc::new(ScoringService::new(scorer, Duration::from_millis(250)));

        let ingestor =
            PaymentWebhookIngestor::new(verifier, Arc::clone(&store), guard, scoring);
        Fixture {
            signer,
            store,
            ingestor,
        }
    }

    fn purchase_payload(user: &str, session: &str, payment: &str, coins: u64) -> Value {
        json!({
            "user_id": user,
            "session_id": session,
            "payment_id": payment,
            "payment_gateway": "stripe",
            "coins_amount": coins,
        })
    }

    #[tokio::test]
    async fn test_purchase_credits_once() {
        let f = fixture();
        let envelope = f.signer.sign(
            "evt_1",
            PURCHASE_COMPLETED,
            purchase_payload("alice", "cs_1", "pay_1", 1000),
        );

        let outcome = f.ingestor.handle(&envelope).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Credited { .. }));
        assert_eq!(
            f.store.get_balance(&UserId::new("alice")).balance,
            Coins::new(1000)
        );
    }

    #[tokio::test]
    async fn test_replayed_event_credits_exactly_once() {
        let f = fixture();
        let envelope = f.signer.sign(
            "evt_1",
            PURCHASE_COMPLETED,
            purchase_payload("alice", "cs_1", "pay_1", 1000),
        );

        let first = f.ingestor.handle(&envelope).await.unwrap();
        let entry_id = match first {
            IngestOutcome::Credited { entry_id } => entry_id,
            other => panic!("expected credit, got {:?}", other),
        };

        // Provider redelivers the same event
        let second = f.ingestor.handle(&envelope).await.unwrap();
        assert_eq!(
            second,
            IngestOutcome::Skipped {
                result_ref: Some(entry_id.to_string()),
            }
        );

        let alice = UserId::new("alice");
        assert_eq!(f.store.get_balance(&alice).balance, Coins::new(1000));
        assert_eq!(f.store.entries_for_user(&alice).len(), 1);
    }

    #[tokio::test]
    async fn test_bad_signature_never_reaches_ledger() {
        let f = fixture();
        let mut envelope = f.signer.sign(
            "evt_1",
            PURCHASE_COMPLETED,
            purchase_payload("alice", "cs_1", "pay_1", 1000),
        );
        envelope.payload = purchase_payload("alice", "cs_1", "pay_1", 999_999);

        let result = f.ingestor.handle(&envelope).await;
        assert!(matches!(
            result,
            Err(WebhookError::InvalidSignature { .. })
        ));
        assert_eq!(
            f.store.get_balance(&UserId::new("alice")).balance,
            Coins::ZERO
        );
    }

    #[tokio::test]
    async fn test_malformed_metadata_is_permanent_rejection() {
        let f = fixture();
        let envelope = f.signer.sign(
            "evt_1",
            PURCHASE_COMPLETED,
            json!({"session_id": "cs_1", "coins_amount": 1000}),
        );

        let outcome = f.ingestor.handle(&envelope).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Rejected { .. }));
        assert!(f
            .store
            .entries_for_user(&UserId::new("alice"))
            .is_empty());
    }

    #[tokio::test]
    async fn test_payment_failed_records_zero_amount_entry() {
        let f = fixture();
        let envelope = f.signer.sign(
            "evt_1",
            PAYMENT_FAILED,
            json!({"user_id": "alice", "payment_id": "pay_1"}),
        );

        let outcome = f.ingestor.handle(&envelope).await.unwrap();
        let entry_id = match outcome {
            IngestOutcome::FailureRecorded { entry_id } => entry_id,
            other => panic!("expected failure record, got {:?}", other),
        };

        let entry = f.store.get_entry(entry_id).unwrap();
        assert_eq!(entry.status, EntryStatus::Failed);
        assert!(entry.amount.is_zero());
        assert_eq!(
            f.store.get_balance(&UserId::new("alice")).balance,
            Coins::ZERO
        );
    }

    #[tokio::test]
    async fn test_full_refund_reverses_whole_purchase() {
        let f = fixture();
        let purchase = f.signer.sign(
            "evt_1",
            PURCHASE_COMPLETED,
            purchase_payload("alice", "cs_1", "pay_1", 1000),
        );
        f.ingestor.handle(&purchase).await.unwrap();

        let refund = f
            .signer
            .sign("evt_2", CHARGE_REFUNDED, json!({"payment_id": "pay_1"}));
        let outcome = f.ingestor.handle(&refund).await.unwrap();

        match outcome {
            IngestOutcome::Refunded {
                entry_id,
                flagged,
                shortfall,
            } => {
                assert!(!flagged);
                assert!(shortfall.is_zero());
                let entry = f.store.get_entry(entry_id).unwrap();
                assert_eq!(entry.status, EntryStatus::Completed);
                assert_eq!(entry.amount, Coins::new(1000));
            }
            other => panic!("expected refund, got {:?}", other),
        }
        assert_eq!(
            f.store.get_balance(&UserId::new("alice")).balance,
            Coins::ZERO
        );
    }

    #[tokio::test]
    async fn test_partial_refund_flags_with_shortfall() {
        let f = fixture();
        let purchase = f.signer.sign(
            "evt_1",
            PURCHASE_COMPLETED,
            purchase_payload("alice", "cs_1", "pay_1", 1000),
        );
        f.ingestor.handle(&purchase).await.unwrap();

        // 800 of the purchase is already spent
        f.store
            .append(
                EntryDraft::new(
                    "alice",
                    EntryType::GiftSent,
                    Coins::new(800),
                    EntryContext::Gift {
                        gift_id: "rose".to_string(),
                        stream_id: None,
                    },
                )
                .counterparty("bob"),
            )
            .unwrap();

        let refund = f
            .signer
            .sign("evt_2", CHARGE_REFUNDED, json!({"payment_id": "pay_1"}));
        let outcome = f.ingestor.handle(&refund).await.unwrap();

        match outcome {
            IngestOutcome::Refunded {
                entry_id,
                flagged,
                shortfall,
            } => {
                assert!(flagged);
                assert_eq!(shortfall, Coins::new(800));
                let entry = f.store.get_entry(entry_id).unwrap();
                assert_eq!(entry.status, EntryStatus::Flagged);
                assert_eq!(entry.amount, Coins::new(200));
                match entry.context {
                    EntryContext::Refund { shortfall, .. } => {
                        assert_eq!(shortfall, Coins::new(800))
                    }
                    other => panic!("expected refund context, got {:?}", other),
                }
            }
            other => panic!("expected refund, got {:?}", other),
        }

        // Clamped at zero, never negative
        assert_eq!(
            f.store.get_balance(&UserId::new("alice")).balance,
            Coins::ZERO
        );
        // The flagged reversal sits in the review queue
        assert_eq!(f.store.flagged_entries().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_refund_is_skipped() {
        let f = fixture();
        let purchase = f.signer.sign(
            "evt_1",
            PURCHASE_COMPLETED,
            purchase_payload("alice", "cs_1", "pay_1", 1000),
        );
        f.ingestor.handle(&purchase).await.unwrap();

        let refund = f
            .signer
            .sign("evt_2", CHARGE_REFUNDED, json!({"payment_id": "pay_1"}));
        f.ingestor.handle(&refund).await.unwrap();

        let replay = f
            .signer
            .sign("evt_3", CHARGE_REFUNDED, json!({"payment_id": "pay_1"}));
        let outcome = f.ingestor.handle(&replay).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Skipped { .. }));
        assert_eq!(
            f.store.get_balance(&UserId::new("alice")).balance,
            Coins::ZERO
        );
    }

    #[tokio::test]
    async fn test_refund_without_matching_purchase_is_rejected() {
        let f = fixture();
        let refund = f
            .signer
            .sign("evt_1", CHARGE_REFUNDED, json!({"payment_id": "pay_x"}));
        let outcome = f.ingestor.handle(&refund).await.unwrap();
        assert!(matches!(outcome, IngestOutcome::Rejected { .. }));
    }
}
