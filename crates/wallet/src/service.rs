//! The consumer API: credit, debit, balance, daily bonus, review actions
//!
//! Pipeline per operation: idempotency guard (before any observable
//! effect) -> fraud scoring (fail-open, bounded latency) -> ledger append
//! -> guard completion -> post-commit velocity/projection updates.

use crate::context::WalletContext;
use crate::error::WalletError;
use chrono::Utc;
use glowcast_core::{Coins, EntryId, UserId};
use glowcast_fraud::ScoreContext;
use glowcast_idempotency::{Begin, KeyTtl};
use glowcast_ledger::{Direction, EntryContext, EntryDraft, EntryType, LedgerEntry};
use glowcast_store::BalanceSnapshot;

/// Caller-supplied request context: optional idempotency key plus the
/// signals the fraud scorer consumes.
#[derive(Debug, Clone, Default)]
pub struct CallerContext {
    /// Maps one-to-one to an idempotency guard key when present
    pub idempotency_key: Option<String>,
    /// Second user for gift entries
    pub counterparty: Option<UserId>,
    pub ip: Option<String>,
    pub device_fingerprint: Option<String>,
    pub declared_country: Option<String>,
    pub ip_country: Option<String>,
}

impl CallerContext {
    pub fn with_key(key: impl Into<String>) -> Self {
        Self {
            idempotency_key: Some(key.into()),
            ..Self::default()
        }
    }
}

/// The coin ledger consumer API
pub struct WalletService {
    ctx: WalletContext,
}

impl WalletService {
    pub fn new(ctx: WalletContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &WalletContext {
        &self.ctx
    }

    /// Credit coins to a user. `entry_type` must be a credit type.
    pub async fn credit(
        &self,
        user_id: impl Into<UserId>,
        entry_type: EntryType,
        amount: Coins,
        context: EntryContext,
        caller: CallerContext,
    ) -> Result<LedgerEntry, WalletError> {
        self.check_direction(entry_type, Direction::Credit)?;
        self.execute(user_id.into(), entry_type, amount, context, caller, KeyTtl::Permanent)
            .await
    }

    /// Debit coins from a user. `entry_type` must be a debit type.
    /// Surfaces `InsufficientBalance` with no partial state.
    pub async fn debit(
        &self,
        user_id: impl Into<UserId>,
        entry_type: EntryType,
        amount: Coins,
        context: EntryContext,
        caller: CallerContext,
    ) -> Result<LedgerEntry, WalletError> {
        self.check_direction(entry_type, Direction::Debit)?;
        self.execute(user_id.into(), entry_type, amount, context, caller, KeyTtl::Permanent)
            .await
    }

    /// Claim the daily bonus. The guard key is derived from the user and
    /// the calendar day; a second same-day claim returns the original
    /// entry without crediting again.
    pub async fn claim_daily_bonus(
        &self,
        user_id: impl Into<UserId>,
        amount: Coins,
    ) -> Result<LedgerEntry, WalletError> {
        let user_id = user_id.into();
        let claim_day = Utc::now().date_naive();
        let key = format!("claim:{}:{}", user_id, claim_day.format("%Y-%m-%d"));

        self.execute(
            user_id,
            EntryType::BonusClaim,
            amount,
            EntryContext::Bonus { claim_day },
            CallerContext::with_key(key),
            KeyTtl::UntilEndOfDay,
        )
        .await
    }

    /// Latest committed balances for a user
    pub fn get_balance(&self, user_id: &UserId) -> BalanceSnapshot {
        self.ctx.store.get_balance(user_id)
    }

    /// All entries for a user in creation order
    pub fn history(&self, user_id: &UserId) -> Vec<LedgerEntry> {
        self.ctx.store.entries_for_user(user_id)
    }

    /// Audit: recompute and check the user's hash chain
    pub fn verify_chain(&self, user_id: &UserId) -> Result<(), WalletError> {
        self.ctx.store.verify_user_chain(user_id)?;
        Ok(())
    }

    /// The manual review queue
    pub fn flagged_entries(&self) -> Vec<LedgerEntry> {
        self.ctx.store.flagged_entries()
    }

    /// Review decision for an entry flagged at creation
    pub async fn resolve_flagged(
        &self,
        entry_id: EntryId,
        approve: bool,
    ) -> Result<LedgerEntry, WalletError> {
        let entry = self.ctx.store.resolve_flagged(entry_id, approve)?;
        self.project(&entry).await;
        Ok(entry)
    }

    /// Review action: flag a completed entry
    pub async fn flag_for_review(&self, entry_id: EntryId) -> Result<LedgerEntry, WalletError> {
        let entry = self.ctx.store.flag_completed(entry_id)?;
        self.project(&entry).await;
        Ok(entry)
    }

    /// Settle an entry that was held for external confirmation
    pub async fn settle_pending(&self, entry_id: EntryId) -> Result<LedgerEntry, WalletError> {
        let entry = self.ctx.store.settle_pending(entry_id)?;
        self.project(&entry).await;
        Ok(entry)
    }

    /// Cancel an entry that was held for external confirmation
    pub async fn cancel_pending(&self, entry_id: EntryId) -> Result<LedgerEntry, WalletError> {
        let entry = self.ctx.store.cancel_pending(entry_id)?;
        self.project(&entry).await;
        Ok(entry)
    }

    // === internals ===

    fn check_direction(&self, entry_type: EntryType, expected: Direction) -> Result<(), WalletError> {
        if entry_type.direction() != expected {
            return Err(WalletError::WrongDirection {
                entry_type,
                expected,
            });
        }
        Ok(())
    }

    async fn execute(
        &self,
        user_id: UserId,
        entry_type: EntryType,
        amount: Coins,
        context: EntryContext,
        caller: CallerContext,
        ttl: KeyTtl,
    ) -> Result<LedgerEntry, WalletError> {
        // The guard comes first: a crash after this point is a retry with
        // a duplicate key, never a second execution
        if let Some(ref key) = caller.idempotency_key {
            match self.ctx.guard.begin(key, ttl)? {
                Begin::New => {}
                Begin::Duplicate {
                    in_flight: true, ..
                } => {
                    return Err(WalletError::OperationInFlight { key: key.clone() });
                }
                Begin::Duplicate { result_ref, .. } => {
                    return self.prior_result(key, result_ref);
                }
            }
        }

        let mut score_ctx = ScoreContext::new(user_id.clone(), entry_type, amount);
        score_ctx.ip = caller.ip.clone();
        score_ctx.device_fingerprint = caller.device_fingerprint.clone();
        score_ctx.declared_country = caller.declared_country.clone();
        score_ctx.ip_country = caller.ip_country.clone();
        let assessment = self.ctx.scoring.assess(&score_ctx).await;

        let mut draft = EntryDraft::new(user_id, entry_type, amount, context)
            .scored(assessment.fraud_score, assessment.risk_level);
        if let Some(counterparty) = caller.counterparty {
            draft = draft.counterparty(counterparty);
        }
        if let Some(ref key) = caller.idempotency_key {
            draft = draft.idempotency_key(key.clone());
        }

        let entry = match self.ctx.store.append(draft) {
            Ok(entry) => entry,
            Err(err) => {
                // Nothing happened - let a retry re-execute
                if let Some(ref key) = caller.idempotency_key {
                    self.ctx.guard.release(key)?;
                }
                return Err(err.into());
            }
        };

        if let Some(ref key) = caller.idempotency_key {
            self.ctx.guard.complete(key, &entry.id.to_string())?;
        }

        if entry.is_chained() {
            self.ctx
                .scorer
                .record(&score_ctx, entry.fraud_score.unwrap_or(0));
        }
        self.project(&entry).await;

        Ok(entry)
    }

    /// Resolve a completed idempotency record back to its entry
    fn prior_result(
        &self,
        key: &str,
        result_ref: Option<String>,
    ) -> Result<LedgerEntry, WalletError> {
        let result_ref = result_ref.ok_or_else(|| WalletError::DanglingResult {
            key: key.to_string(),
            result_ref: String::new(),
        })?;

        EntryId::parse(&result_ref)
            .ok()
            .and_then(|id| self.ctx.store.get_entry(id))
            .ok_or_else(|| WalletError::DanglingResult {
                key: key.to_string(),
                result_ref,
            })
    }

    /// Best-effort view update; the store stays authoritative
    async fn project(&self, entry: &LedgerEntry) {
        if let Some(ref projection) = self.ctx.projection {
            if let Err(err) = projection.apply(entry).await {
                tracing::warn!(entry_id = %entry.id, error = %err, "projection apply failed");
            }
        }
    }
}
