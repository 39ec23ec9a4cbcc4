//! The ledger store - sole writer of entries and balance accounts
//!
//! Append flow: validate -> snapshot read -> effect computation -> hash ->
//! commit section (version re-check, journal line, balance CAS, indices).
//! Operations on different users proceed in parallel; operations on the
//! same user serialize through the optimistic version check with bounded,
//! jittered retries.

use crate::account::{AccountDelta, Accounts, BalanceAccount, BalanceSnapshot, PoolDelta};
use crate::error::StoreError;
use crate::journal::{JournalReader, LedgerJournal};
use chrono::Utc;
use glowcast_core::{Coins, EntryId, UserId};
use glowcast_ledger::{
    calculate_entry_hash, validate_draft, verify_chain, BalancePool, Direction, Disposition,
    EntryDraft, EntryStatus, EntryType, LedgerEntry, GENESIS_HASH,
};
use rand::Rng;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, RwLock};
use std::time::Duration;

/// Store tuning knobs
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Attempts before a version race is surfaced as transient
    #[serde(default = "default_max_append_retries")]
    pub max_append_retries: u32,

    /// Base backoff per attempt; actual sleep adds random jitter
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_max_append_retries() -> u32 {
    5
}

fn default_retry_backoff_ms() -> u64 {
    10
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_append_retries: default_max_append_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
        }
    }
}

/// Everything the store guards behind one lock
#[derive(Default)]
struct StoreState {
    accounts: Accounts,
    entries: HashMap<EntryId, LedgerEntry>,
    /// Entry ids per user in creation order
    user_entries: HashMap<UserId, Vec<EntryId>>,
    /// Chained entry ids per user in commit order
    user_chains: HashMap<UserId, Vec<EntryId>>,
    /// Hash of each user's most recent chained entry
    chain_heads: HashMap<UserId, String>,
    /// Completed purchase lookup for refund reversal
    by_external_payment: HashMap<String, EntryId>,
    /// Users whose chain failed verification - appends refused
    audit_holds: HashSet<UserId>,
}

impl StoreState {
    fn chain_head(&self, user_id: &UserId) -> String {
        self.chain_heads
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| GENESIS_HASH.to_string())
    }
}

/// Append-only ledger store.
///
/// The store is the only component that writes entries or mutates
/// `BalanceAccount`s, and it does both inside one commit section.
pub struct LedgerStore {
    state: RwLock<StoreState>,
    journal: Option<Mutex<LedgerJournal>>,
    config: StoreConfig,
}

impl LedgerStore {
    /// Open a journal-backed store, replaying all existing records
    pub fn open(journal_dir: impl AsRef<Path>, config: StoreConfig) -> Result<Self, StoreError> {
        let journal_dir = journal_dir.as_ref();
        let reader = JournalReader::from_directory(journal_dir)?;
        let records = reader.read_all()?;

        let mut state = StoreState::default();
        for record in &records {
            Self::replay_record(&mut state, record)?;
        }

        tracing::info!(
            records = records.len(),
            accounts = state.accounts.len(),
            "ledger store replayed"
        );

        let journal = LedgerJournal::new(journal_dir)?;

        Ok(Self {
            state: RwLock::new(state),
            journal: Some(Mutex::new(journal)),
            config,
        })
    }

    /// In-memory store without a journal (tests, tooling)
    pub fn ephemeral(config: StoreConfig) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            journal: None,
            config,
        }
    }

    /// Append one entry for one economic event.
    ///
    /// Returns the persisted entry - the only observable side-effect
    /// channel. Fails with `InsufficientBalance` before any write if a
    /// debit is not covered, and with `ConcurrentModification` if the
    /// version race is lost on every attempt.
    pub fn append(&self, draft: EntryDraft) -> Result<LedgerEntry, StoreError> {
        validate_draft(&draft)?;

        let status = Self::target_status(&draft);
        let applies_balance = applies_balance(status, draft.disposition);

        let mut attempt = 0;
        loop {
            attempt += 1;

            let (snapshot, prev_hash) = {
                let state = self.state.read().expect("store lock poisoned");
                if state.audit_holds.contains(&draft.user_id) {
                    return Err(StoreError::AuditHold {
                        user_id: draft.user_id.clone(),
                    });
                }
                (state.accounts.snapshot(&draft.user_id), state.chain_head(&draft.user_id))
            };

            let entry = self.build_entry(&draft, status, &snapshot, &prev_hash, applies_balance)?;

            let mut state = self.state.write().expect("store lock poisoned");

            if applies_balance {
                let current = state.accounts.snapshot(&draft.user_id);
                if current.version != snapshot.version {
                    drop(state);
                    if attempt >= self.config.max_append_retries {
                        tracing::warn!(
                            user_id = %draft.user_id,
                            attempts = attempt,
                            "append lost version race on every attempt"
                        );
                        return Err(StoreError::ConcurrentModification {
                            user_id: draft.user_id.clone(),
                            attempts: attempt,
                        });
                    }
                    self.backoff(attempt);
                    continue;
                }
            }

            self.journal_append(&entry)?;
            Self::commit(&mut state, &entry, snapshot.version)?;
            return Ok(entry);
        }
    }

    /// Settle a pending entry: the balance effect and the chain link are
    /// computed now, against the current account state.
    pub fn settle_pending(&self, entry_id: EntryId) -> Result<LedgerEntry, StoreError> {
        self.finalize(entry_id, EntryStatus::Pending, EntryStatus::Completed)
    }

    /// Cancel a pending entry without any balance effect
    pub fn cancel_pending(&self, entry_id: EntryId) -> Result<LedgerEntry, StoreError> {
        self.finalize(entry_id, EntryStatus::Pending, EntryStatus::Cancelled)
    }

    /// Resolve an entry flagged at creation: approve applies the withheld
    /// balance effect (chained as of now), reject cancels it.
    pub fn resolve_flagged(
        &self,
        entry_id: EntryId,
        approve: bool,
    ) -> Result<LedgerEntry, StoreError> {
        let target = if approve {
            EntryStatus::Completed
        } else {
            EntryStatus::Cancelled
        };
        self.finalize(entry_id, EntryStatus::Flagged, target)
    }

    /// Review action: mark a completed entry flagged. Its balance effect
    /// and chain link stand; the flag is a review marker.
    pub fn flag_completed(&self, entry_id: EntryId) -> Result<LedgerEntry, StoreError> {
        let mut state = self.state.write().expect("store lock poisoned");

        let entry = state
            .entries
            .get(&entry_id)
            .ok_or(StoreError::EntryNotFound(entry_id))?;
        if entry.status != EntryStatus::Completed {
            return Err(StoreError::InvalidTransition {
                entry_id,
                from: entry.status,
                to: EntryStatus::Flagged,
            });
        }

        let mut updated = entry.clone();
        updated.status = EntryStatus::Flagged;
        self.journal_append(&updated)?;
        state.entries.insert(entry_id, updated.clone());

        tracing::warn!(target: "audit", entry_id = %entry_id, user_id = %updated.user_id, "completed entry flagged for review");
        Ok(updated)
    }

    /// Recompute every chained entry's hash for a user and check linkage
    /// and balance continuity. On the first mismatch the offending entry id
    /// is reported and the user is placed under an audit hold: further
    /// appends are refused until `release_audit_hold`.
    pub fn verify_user_chain(&self, user_id: &UserId) -> Result<(), StoreError> {
        let violation = {
            let state = self.state.read().expect("store lock poisoned");
            let chain = Self::chained_entries(&state, user_id);
            Self::check_chain(user_id, &chain)
        };

        if let Err(err) = violation {
            let mut state = self.state.write().expect("store lock poisoned");
            state.audit_holds.insert(user_id.clone());
            tracing::error!(target: "audit", user_id = %user_id, error = %err, "ledger chain verification failed");
            return Err(err);
        }
        Ok(())
    }

    /// Lift the audit hold after manual review
    pub fn release_audit_hold(&self, user_id: &UserId) {
        let mut state = self.state.write().expect("store lock poisoned");
        state.audit_holds.remove(user_id);
    }

    /// Read-only balance snapshot; zeroes for users with no account yet
    pub fn get_balance(&self, user_id: &UserId) -> BalanceSnapshot {
        let state = self.state.read().expect("store lock poisoned");
        state.accounts.snapshot(user_id)
    }

    /// Full account projection (totals included)
    pub fn account(&self, user_id: &UserId) -> Option<BalanceAccount> {
        let state = self.state.read().expect("store lock poisoned");
        state.accounts.get(user_id).cloned()
    }

    /// All entries for a user in creation order
    pub fn entries_for_user(&self, user_id: &UserId) -> Vec<LedgerEntry> {
        let state = self.state.read().expect("store lock poisoned");
        state
            .user_entries
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.entries.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Completed purchase entry for a provider payment id, if any
    pub fn find_by_external_payment_id(&self, payment_id: &str) -> Option<LedgerEntry> {
        let state = self.state.read().expect("store lock poisoned");
        state
            .by_external_payment
            .get(payment_id)
            .and_then(|id| state.entries.get(id).cloned())
    }

    pub fn get_entry(&self, entry_id: EntryId) -> Option<LedgerEntry> {
        let state = self.state.read().expect("store lock poisoned");
        state.entries.get(&entry_id).cloned()
    }

    /// All flagged entries (the manual-review queue)
    pub fn flagged_entries(&self) -> Vec<LedgerEntry> {
        let state = self.state.read().expect("store lock poisoned");
        let mut flagged: Vec<LedgerEntry> = state
            .entries
            .values()
            .filter(|e| e.status == EntryStatus::Flagged)
            .cloned()
            .collect();
        flagged.sort_by_key(|e| e.created_at);
        flagged
    }

    // === internals ===

    fn target_status(draft: &EntryDraft) -> EntryStatus {
        let review_forced = draft
            .risk_level
            .map(|level| level.requires_review())
            .unwrap_or(false);

        match draft.disposition {
            Disposition::RecordFailure => EntryStatus::Failed,
            Disposition::SettleFlagged => EntryStatus::Flagged,
            _ if review_forced => EntryStatus::Flagged,
            Disposition::Hold => EntryStatus::Pending,
            Disposition::Settle => EntryStatus::Completed,
        }
    }

    fn build_entry(
        &self,
        draft: &EntryDraft,
        status: EntryStatus,
        snapshot: &BalanceSnapshot,
        prev_hash: &str,
        applies_balance: bool,
    ) -> Result<LedgerEntry, StoreError> {
        let now = Utc::now();

        let (pool, balance_before, balance_after) = if applies_balance {
            Self::compute_effect(draft, snapshot)?
        } else {
            let pool = draft.entry_type.pool();
            let current = pool_balance(snapshot, pool);
            (pool, current, current)
        };

        let mut entry = LedgerEntry {
            id: EntryId::generate(),
            user_id: draft.user_id.clone(),
            counterparty_id: draft.counterparty_id.clone(),
            entry_type: draft.entry_type,
            amount: draft.amount,
            balance_before,
            balance_after,
            source: draft.source,
            destination: draft.destination,
            pool,
            context: draft.context.clone(),
            status,
            created_at: now,
            processed_at: processed_at(status, applies_balance, now),
            fraud_score: draft.fraud_score,
            risk_level: draft.risk_level,
            hash: String::new(),
            previous_hash: String::new(),
            idempotency_key: draft.idempotency_key.clone(),
            external_payment_id: draft.external_payment_id.clone(),
        };

        if applies_balance {
            entry.previous_hash = prev_hash.to_string();
            entry.hash = calculate_entry_hash(&entry);
        }

        Ok(entry)
    }

    /// Pick the pool and compute the before/after balances for an entry
    /// that applies its effect now.
    fn compute_effect(
        draft: &EntryDraft,
        snapshot: &BalanceSnapshot,
    ) -> Result<(BalancePool, Coins, Coins), StoreError> {
        match draft.entry_type.direction() {
            Direction::Credit => {
                let pool = draft.entry_type.pool();
                let before = pool_balance(snapshot, pool);
                let after = before.checked_add(draft.amount).ok_or(StoreError::Account(
                    crate::account::AccountError::Overflow {
                        user_id: draft.user_id.clone(),
                    },
                ))?;
                Ok((pool, before, after))
            }
            Direction::Debit => {
                // Bonus coins satisfy a debit only when the type allows it
                // and they cover the full amount
                let pool = if draft.entry_type.allows_bonus_spend()
                    && snapshot.bonus_balance >= draft.amount
                {
                    BalancePool::Bonus
                } else {
                    BalancePool::Withdrawable
                };
                let before = pool_balance(snapshot, pool);
                let after =
                    before
                        .checked_sub(draft.amount)
                        .ok_or(StoreError::InsufficientBalance {
                            user_id: draft.user_id.clone(),
                            available: before,
                            required: draft.amount,
                        })?;
                Ok((pool, before, after))
            }
        }
    }

    /// Apply a built entry to state. Caller holds the write guard and has
    /// re-checked the version; the journal line is already written.
    fn commit(
        state: &mut StoreState,
        entry: &LedgerEntry,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        if entry.is_chained() {
            let delta = entry_delta(entry);
            state
                .accounts
                .apply_delta(&entry.user_id, delta, expected_version)?;
            state
                .chain_heads
                .insert(entry.user_id.clone(), entry.hash.clone());
            state
                .user_chains
                .entry(entry.user_id.clone())
                .or_default()
                .push(entry.id);
        }

        state
            .user_entries
            .entry(entry.user_id.clone())
            .or_default()
            .push(entry.id);

        if entry.entry_type == EntryType::Purchase && entry.is_chained() {
            if let Some(ref payment_id) = entry.external_payment_id {
                state
                    .by_external_payment
                    .entry(payment_id.clone())
                    .or_insert(entry.id);
            }
        }

        state.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    /// Shared transition path for settle/cancel/resolve
    fn finalize(
        &self,
        entry_id: EntryId,
        from: EntryStatus,
        to: EntryStatus,
    ) -> Result<LedgerEntry, StoreError> {
        let mut state = self.state.write().expect("store lock poisoned");

        let entry = state
            .entries
            .get(&entry_id)
            .ok_or(StoreError::EntryNotFound(entry_id))?
            .clone();

        if entry.status != from || entry.is_chained() {
            return Err(StoreError::InvalidTransition {
                entry_id,
                from: entry.status,
                to,
            });
        }
        if state.audit_holds.contains(&entry.user_id) {
            return Err(StoreError::AuditHold {
                user_id: entry.user_id.clone(),
            });
        }

        let mut updated = entry;
        let now = Utc::now();
        updated.status = to;
        updated.processed_at = Some(now);

        if to == EntryStatus::Completed {
            let snapshot = state.accounts.snapshot(&updated.user_id);
            let draft_view = EntryDraft {
                user_id: updated.user_id.clone(),
                counterparty_id: updated.counterparty_id.clone(),
                entry_type: updated.entry_type,
                amount: updated.amount,
                source: updated.source,
                destination: updated.destination,
                context: updated.context.clone(),
                disposition: Disposition::Settle,
                fraud_score: updated.fraud_score,
                risk_level: updated.risk_level,
                idempotency_key: updated.idempotency_key.clone(),
                external_payment_id: updated.external_payment_id.clone(),
            };
            let (pool, before, after) = Self::compute_effect(&draft_view, &snapshot)?;
            updated.pool = pool;
            updated.balance_before = before;
            updated.balance_after = after;
            updated.previous_hash = state.chain_head(&updated.user_id);
            updated.hash = calculate_entry_hash(&updated);

            self.journal_append(&updated)?;
            Self::commit_transition(&mut state, &updated, snapshot.version)?;
        } else {
            self.journal_append(&updated)?;
            state.entries.insert(entry_id, updated.clone());
        }

        Ok(updated)
    }

    /// Commit for an entry that gained its balance effect in a transition
    fn commit_transition(
        state: &mut StoreState,
        entry: &LedgerEntry,
        expected_version: u64,
    ) -> Result<(), StoreError> {
        let delta = entry_delta(entry);
        state
            .accounts
            .apply_delta(&entry.user_id, delta, expected_version)?;
        state
            .chain_heads
            .insert(entry.user_id.clone(), entry.hash.clone());
        state
            .user_chains
            .entry(entry.user_id.clone())
            .or_default()
            .push(entry.id);

        if entry.entry_type == EntryType::Purchase {
            if let Some(ref payment_id) = entry.external_payment_id {
                state
                    .by_external_payment
                    .entry(payment_id.clone())
                    .or_insert(entry.id);
            }
        }

        state.entries.insert(entry.id, entry.clone());
        Ok(())
    }

    fn chained_entries(state: &StoreState, user_id: &UserId) -> Vec<LedgerEntry> {
        state
            .user_chains
            .get(user_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.entries.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Hash linkage plus per-pool balance continuity, in commit order
    fn check_chain(user_id: &UserId, chain: &[LedgerEntry]) -> Result<(), StoreError> {
        verify_chain(chain).map_err(|source| StoreError::IntegrityViolation {
            user_id: user_id.clone(),
            source,
        })?;

        let mut last_after: HashMap<BalancePool, Coins> = HashMap::new();
        for entry in chain {
            let expected = last_after.get(&entry.pool).copied().unwrap_or(Coins::ZERO);
            if entry.balance_before != expected {
                return Err(StoreError::BalanceDiscontinuity {
                    user_id: user_id.clone(),
                    entry_id: entry.id,
                    expected,
                    actual: entry.balance_before,
                });
            }
            last_after.insert(entry.pool, entry.balance_after);
        }
        Ok(())
    }

    fn replay_record(state: &mut StoreState, record: &LedgerEntry) -> Result<(), StoreError> {
        let known = state.entries.contains_key(&record.id);
        let already_applied = state
            .entries
            .get(&record.id)
            .map(|existing| existing.is_chained())
            .unwrap_or(false);

        if record.is_chained() && !already_applied {
            let version = state.accounts.snapshot(&record.user_id).version;
            state
                .accounts
                .apply_delta(&record.user_id, entry_delta(record), version)?;
            state
                .chain_heads
                .insert(record.user_id.clone(), record.hash.clone());
            state
                .user_chains
                .entry(record.user_id.clone())
                .or_default()
                .push(record.id);

            if record.entry_type == EntryType::Purchase {
                if let Some(ref payment_id) = record.external_payment_id {
                    state
                        .by_external_payment
                        .entry(payment_id.clone())
                        .or_insert(record.id);
                }
            }
        }

        if !known {
            state
                .user_entries
                .entry(record.user_id.clone())
                .or_default()
                .push(record.id);
        }
        state.entries.insert(record.id, record.clone());
        Ok(())
    }

    fn journal_append(&self, entry: &LedgerEntry) -> Result<(), StoreError> {
        if let Some(ref journal) = self.journal {
            journal
                .lock()
                .expect("journal lock poisoned")
                .append(entry)?;
        }
        Ok(())
    }

    fn backoff(&self, attempt: u32) {
        let base = self.config.retry_backoff_ms;
        let jitter = rand::thread_rng().gen_range(0..=base);
        std::thread::sleep(Duration::from_millis(base * u64::from(attempt) + jitter));
    }
}

fn applies_balance(status: EntryStatus, disposition: Disposition) -> bool {
    status == EntryStatus::Completed
        || (status == EntryStatus::Flagged && disposition == Disposition::SettleFlagged)
}

fn pool_balance(snapshot: &BalanceSnapshot, pool: BalancePool) -> Coins {
    match pool {
        BalancePool::Withdrawable => snapshot.balance,
        BalancePool::Bonus => snapshot.bonus_balance,
    }
}

fn processed_at(
    status: EntryStatus,
    applies_balance: bool,
    now: chrono::DateTime<Utc>,
) -> Option<chrono::DateTime<Utc>> {
    match status {
        EntryStatus::Completed | EntryStatus::Failed | EntryStatus::Cancelled => Some(now),
        EntryStatus::Flagged if applies_balance => Some(now),
        _ => None,
    }
}

/// Balance delta an applied entry carries
fn entry_delta(entry: &LedgerEntry) -> AccountDelta {
    let pool_delta = match entry.entry_type.direction() {
        Direction::Credit => PoolDelta::Credit(entry.amount),
        Direction::Debit => PoolDelta::Debit(entry.amount),
    };
    AccountDelta::on_pool(entry.pool, pool_delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glowcast_ledger::{EntryContext, RiskLevel};
    use std::sync::Arc;

    fn store() -> LedgerStore {
        LedgerStore::ephemeral(StoreConfig::default())
    }

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

    fn stake(user: &str, amount: u64) -> EntryDraft {
        EntryDraft::new(
            user,
            EntryType::GameStake,
            Coins::new(amount),
            EntryContext::Game {
                game_id: "wheel".to_string(),
                session_id: None,
            },
        )
    }

    #[test]
    fn test_purchase_credits_balance() {
        let store = store();
        let entry = store.append(purchase("alice", 1000, "pay_1")).unwrap();

        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(entry.balance_before, Coins::ZERO);
        assert_eq!(entry.balance_after, Coins::new(1000));
        assert_eq!(entry.previous_hash, GENESIS_HASH);

        let snapshot = store.get_balance(&UserId::new("alice"));
        assert_eq!(snapshot.balance, Coins::new(1000));
        assert_eq!(snapshot.version, 1);
    }

    #[test]
    fn test_balances_chain_across_entries() {
        let store = store();
        store.append(purchase("alice", 1000, "pay_1")).unwrap();
        store.append(stake("alice", 300)).unwrap();
        let win = store
            .append(EntryDraft::new(
                "alice",
                EntryType::GameWin,
                Coins::new(450),
                EntryContext::Game {
                    game_id: "wheel".to_string(),
                    session_id: None,
                },
            ))
            .unwrap();

        let entries = store.entries_for_user(&UserId::new("alice"));
        assert_eq!(entries.len(), 3);
        for window in entries.windows(2) {
            assert_eq!(window[1].balance_before, window[0].balance_after);
        }
        assert_eq!(win.balance_after, Coins::new(1150));

        let account = store.account(&UserId::new("alice")).unwrap();
        assert_eq!(account.total_earned, Coins::new(1450));
        assert_eq!(account.total_spent, Coins::new(300));
    }

    #[test]
    fn test_insufficient_balance_leaves_no_partial_state() {
        let store = store();
        store.append(purchase("alice", 100, "pay_1")).unwrap();

        let result = store.append(stake("alice", 500));
        assert!(matches!(
            result,
            Err(StoreError::InsufficientBalance { .. })
        ));

        assert_eq!(store.get_balance(&UserId::new("alice")).balance, Coins::new(100));
        assert_eq!(store.entries_for_user(&UserId::new("alice")).len(), 1);
    }

    #[test]
    fn test_concurrent_debits_exactly_one_wins() {
        let store = Arc::new(store());
        store.append(purchase("alice", 100, "pay_1")).unwrap();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || store.append(stake("alice", 80)))
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let succeeded = results.iter().filter(|r| r.is_ok()).count();
        let insufficient = results
            .iter()
            .filter(|r| matches!(r, Err(StoreError::InsufficientBalance { .. })))
            .count();

        assert_eq!(succeeded, 1);
        assert_eq!(insufficient, 1);
        assert_eq!(store.get_balance(&UserId::new("alice")).balance, Coins::new(20));
    }

    #[test]
    fn test_chain_verifies_and_detects_tampering() {
        let store = store();
        store.append(purchase("alice", 1000, "pay_1")).unwrap();
        store.append(stake("alice", 300)).unwrap();

        let alice = UserId::new("alice");
        assert!(store.verify_user_chain(&alice).is_ok());

        // Mutate a stored entry behind the store's back
        {
            let mut state = store.state.write().unwrap();
            let id = state.user_chains.get(&alice).unwrap()[0];
            state.entries.get_mut(&id).unwrap().amount = Coins::new(999_999);
        }

        let result = store.verify_user_chain(&alice);
        assert!(matches!(
            result,
            Err(StoreError::IntegrityViolation { .. })
        ));

        // Audit hold blocks further appends until released
        let blocked = store.append(stake("alice", 10));
        assert!(matches!(blocked, Err(StoreError::AuditHold { .. })));
        store.release_audit_hold(&alice);
    }

    #[test]
    fn test_high_risk_draft_is_flagged_without_balance_effect() {
        let store = store();
        let entry = store
            .append(purchase("alice", 1000, "pay_1").scored(82, RiskLevel::High))
            .unwrap();

        assert_eq!(entry.status, EntryStatus::Flagged);
        assert!(entry.hash.is_empty());
        assert_eq!(store.get_balance(&UserId::new("alice")).balance, Coins::ZERO);

        // Approval applies the withheld effect and joins the chain
        let resolved = store.resolve_flagged(entry.id, true).unwrap();
        assert_eq!(resolved.status, EntryStatus::Completed);
        assert_eq!(resolved.previous_hash, GENESIS_HASH);
        assert_eq!(store.get_balance(&UserId::new("alice")).balance, Coins::new(1000));
    }

    #[test]
    fn test_rejected_flagged_entry_never_credits() {
        let store = store();
        let entry = store
            .append(purchase("alice", 1000, "pay_1").scored(95, RiskLevel::Critical))
            .unwrap();

        let resolved = store.resolve_flagged(entry.id, false).unwrap();
        assert_eq!(resolved.status, EntryStatus::Cancelled);
        assert_eq!(store.get_balance(&UserId::new("alice")).balance, Coins::ZERO);
        assert!(store.verify_user_chain(&UserId::new("alice")).is_ok());
    }

    #[test]
    fn test_pending_settles_with_chain_link_at_settle_time() {
        let store = store();
        store.append(purchase("alice", 500, "pay_1")).unwrap();

        let held = store
            .append(stake("alice", 200).disposition(Disposition::Hold))
            .unwrap();
        assert_eq!(held.status, EntryStatus::Pending);
        assert!(held.hash.is_empty());
        assert_eq!(store.get_balance(&UserId::new("alice")).balance, Coins::new(500));

        // Another entry commits while the stake is pending
        store.append(purchase("alice", 100, "pay_2")).unwrap();

        let settled = store.settle_pending(held.id).unwrap();
        assert_eq!(settled.status, EntryStatus::Completed);
        assert_eq!(settled.balance_before, Coins::new(600));
        assert_eq!(settled.balance_after, Coins::new(400));
        assert!(store.verify_user_chain(&UserId::new("alice")).is_ok());
    }

    #[test]
    fn test_cancelled_pending_has_no_effect() {
        let store = store();
        store.append(purchase("alice", 500, "pay_1")).unwrap();
        let held = store
            .append(stake("alice", 200).disposition(Disposition::Hold))
            .unwrap();

        let cancelled = store.cancel_pending(held.id).unwrap();
        assert_eq!(cancelled.status, EntryStatus::Cancelled);
        assert_eq!(store.get_balance(&UserId::new("alice")).balance, Coins::new(500));

        // Terminal states cannot transition again
        let again = store.settle_pending(held.id);
        assert!(matches!(again, Err(StoreError::InvalidTransition { .. })));
    }

    #[test]
    fn test_stake_fully_covered_by_bonus_spends_bonus() {
        let store = store();
        store
            .append(EntryDraft::new(
                "alice",
                EntryType::BonusClaim,
                Coins::new(50),
                EntryContext::Bonus {
                    claim_day: Utc::now().date_naive(),
                },
            ))
            .unwrap();
        store.append(purchase("alice", 500, "pay_1")).unwrap();

        let entry = store.append(stake("alice", 40)).unwrap();
        assert_eq!(entry.pool, BalancePool::Bonus);

        let snapshot = store.get_balance(&UserId::new("alice"));
        assert_eq!(snapshot.bonus_balance, Coins::new(10));
        assert_eq!(snapshot.balance, Coins::new(500));
    }

    #[test]
    fn test_stake_partially_covered_by_bonus_spends_withdrawable() {
        let store = store();
        store
            .append(EntryDraft::new(
                "alice",
                EntryType::BonusClaim,
                Coins::new(50),
                EntryContext::Bonus {
                    claim_day: Utc::now().date_naive(),
                },
            ))
            .unwrap();
        store.append(purchase("alice", 500, "pay_1")).unwrap();

        let entry = store.append(stake("alice", 200)).unwrap();
        assert_eq!(entry.pool, BalancePool::Withdrawable);
        assert_eq!(store.get_balance(&UserId::new("alice")).balance, Coins::new(300));
    }

    #[test]
    fn test_failed_record_keeps_zero_amount_and_no_effect() {
        let store = store();
        let mut draft = purchase("alice", 0, "pay_9").disposition(Disposition::RecordFailure);
        draft.amount = Coins::ZERO;

        let entry = store.append(draft).unwrap();
        assert_eq!(entry.status, EntryStatus::Failed);
        assert!(entry.hash.is_empty());
        assert_eq!(store.get_balance(&UserId::new("alice")).balance, Coins::ZERO);
    }

    #[test]
    fn test_journal_replay_rebuilds_state() {
        let dir = tempfile::tempdir().unwrap();
        let alice = UserId::new("alice");

        let (pending_id, flagged_id) = {
            let store = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
            store.append(purchase("alice", 1000, "pay_1")).unwrap();
            store.append(stake("alice", 300)).unwrap();
            let pending = store
                .append(stake("alice", 100).disposition(Disposition::Hold))
                .unwrap();
            let flagged = store
                .append(purchase("alice", 200, "pay_2").scored(90, RiskLevel::High))
                .unwrap();
            (pending.id, flagged.id)
        };

        let reopened = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
        let snapshot = reopened.get_balance(&alice);
        assert_eq!(snapshot.balance, Coins::new(700));
        assert_eq!(snapshot.version, 2);
        assert_eq!(reopened.entries_for_user(&alice).len(), 4);
        assert_eq!(
            reopened.get_entry(pending_id).unwrap().status,
            EntryStatus::Pending
        );
        assert_eq!(
            reopened.get_entry(flagged_id).unwrap().status,
            EntryStatus::Flagged
        );
        assert!(reopened.verify_user_chain(&alice).is_ok());
        assert!(reopened
            .find_by_external_payment_id("pay_1")
            .is_some());

        // Transitions replay too
        reopened.settle_pending(pending_id).unwrap();
        drop(reopened);

        let third = LedgerStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(third.get_balance(&alice).balance, Coins::new(600));
        assert!(third.verify_user_chain(&alice).is_ok());
    }
}
