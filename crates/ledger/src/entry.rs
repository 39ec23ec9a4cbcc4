//! Ledger entry model
//!
//! An entry records one economic event for one user. The sign convention,
//! the balance pool it touches, and the allowed fund flow are all functions
//! of `EntryType` - callers never choose them freely.

use chrono::{DateTime, NaiveDate, Utc};
use glowcast_core::{Coins, EntryId, UserId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use strum_macros::{Display, EnumString};

/// Kind of economic event
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    /// Coin pack bought through a payment provider
    Purchase,
    /// Gift sent to another user (debits the sender)
    GiftSent,
    /// Gift received from another user (credits the receiver)
    GiftReceived,
    /// Stake placed into a game round
    GameStake,
    /// Winnings paid out of a game round
    GameWin,
    /// Loss settled against a game round
    GameLoss,
    /// Platform-granted reward
    Reward,
    /// Subscription paid with coins
    SubscriptionPurchase,
    /// Coins withdrawn out of the platform
    Withdrawal,
    /// Reversal of a purchase after a provider refund
    Refund,
    /// Daily bonus claim
    BonusClaim,
}

/// Whether an entry type increases or decreases the user's balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Credit,
    Debit,
}

/// Which balance pool an entry's effect lands on
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BalancePool {
    /// Withdrawable coin balance
    Withdrawable,
    /// Non-withdrawable bonus balance
    Bonus,
}

impl EntryType {
    /// Sign convention for this type
    pub fn direction(&self) -> Direction {
        match self {
            EntryType::Purchase
            | EntryType::GiftReceived
            | EntryType::GameWin
            | EntryType::Reward
            | EntryType::BonusClaim => Direction::Credit,
            EntryType::GiftSent
            | EntryType::GameStake
            | EntryType::GameLoss
            | EntryType::SubscriptionPurchase
            | EntryType::Withdrawal
            | EntryType::Refund => Direction::Debit,
        }
    }

    /// The balance pool a credit of this type lands on
    pub fn pool(&self) -> BalancePool {
        match self {
            EntryType::BonusClaim => BalancePool::Bonus,
            _ => BalancePool::Withdrawable,
        }
    }

    /// Whether a debit of this type may draw on the bonus balance first.
    ///
    /// Game stakes are the one debit the platform lets users pay with
    /// bonus coins; everything else draws on the withdrawable balance only.
    pub fn allows_bonus_spend(&self) -> bool {
        matches!(self, EntryType::GameStake)
    }

    /// The canonical {source, destination} flow for this type
    pub fn flow(&self) -> (FundSource, FundDestination) {
        match self {
            EntryType::Purchase => (FundSource::Purchase, FundDestination::Wallet),
            EntryType::GiftSent => (FundSource::Wallet, FundDestination::Gift),
            EntryType::GiftReceived => (FundSource::Gift, FundDestination::Wallet),
            EntryType::GameStake => (FundSource::Wallet, FundDestination::Game),
            EntryType::GameWin => (FundSource::Game, FundDestination::Wallet),
            EntryType::GameLoss => (FundSource::Wallet, FundDestination::Game),
            EntryType::Reward => (FundSource::System, FundDestination::Wallet),
            EntryType::SubscriptionPurchase => (FundSource::Wallet, FundDestination::Platform),
            EntryType::Withdrawal => (FundSource::Wallet, FundDestination::External),
            EntryType::Refund => (FundSource::Wallet, FundDestination::External),
            EntryType::BonusClaim => (FundSource::System, FundDestination::Bonus),
        }
    }
}

/// Where the coins of an entry come from
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FundSource {
    Purchase,
    Wallet,
    Gift,
    Game,
    System,
}

/// Where the coins of an entry go
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FundDestination {
    Wallet,
    Gift,
    Game,
    Platform,
    External,
    Bonus,
}

/// Lifecycle status of an entry
///
/// `Pending -> {Completed, Failed, Cancelled}`, plus `Completed -> Flagged`
/// through a separate review action. Entries are never deleted.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    Flagged,
}

/// Fraud-risk band - ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low = 1,
    Medium = 2,
    High = 3,
    Critical = 4,
}

impl PartialOrd for RiskLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RiskLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        (*self as u8).cmp(&(*other as u8))
    }
}

impl RiskLevel {
    /// Levels at and above this one force the entry to `Flagged`
    pub fn requires_review(&self) -> bool {
        *self >= RiskLevel::High
    }
}

/// Type-specific context, validated against the entry type at construction.
///
/// Each variant carries only the fields relevant to its type - there is no
/// free-form metadata bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryContext {
    /// Purchase: which provider payment produced the coins
    Purchase {
        payment_id: String,
        payment_gateway: String,
    },
    /// GiftSent / GiftReceived: which gift, optionally on which stream
    Gift {
        gift_id: String,
        stream_id: Option<String>,
    },
    /// GameStake / GameWin / GameLoss: which game round
    Game {
        game_id: String,
        session_id: Option<String>,
    },
    /// SubscriptionPurchase: which plan for how long
    Subscription { plan_id: String, period_months: u8 },
    /// BonusClaim: which calendar day was claimed
    Bonus { claim_day: NaiveDate },
    /// Withdrawal: payout reference
    Withdrawal { payout_id: String },
    /// Refund: which purchase is reversed, and how much of it could not be
    /// recovered because the coins were already spent
    Refund {
        original_entry_id: EntryId,
        shortfall: Coins,
    },
    /// Reward: free-standing platform grant
    System { note: Option<String> },
}

impl EntryContext {
    /// Short name of the variant (for errors and logs)
    pub fn kind(&self) -> &'static str {
        match self {
            EntryContext::Purchase { .. } => "purchase",
            EntryContext::Gift { .. } => "gift",
            EntryContext::Game { .. } => "game",
            EntryContext::Subscription { .. } => "subscription",
            EntryContext::Bonus { .. } => "bonus",
            EntryContext::Withdrawal { .. } => "withdrawal",
            EntryContext::Refund { .. } => "refund",
            EntryContext::System { .. } => "system",
        }
    }

    /// Whether this variant is the right one for the given entry type
    pub fn matches(&self, entry_type: EntryType) -> bool {
        matches!(
            (entry_type, self),
            (EntryType::Purchase, EntryContext::Purchase { .. })
                | (EntryType::GiftSent, EntryContext::Gift { .. })
                | (EntryType::GiftReceived, EntryContext::Gift { .. })
                | (EntryType::GameStake, EntryContext::Game { .. })
                | (EntryType::GameWin, EntryContext::Game { .. })
                | (EntryType::GameLoss, EntryContext::Game { .. })
                | (EntryType::SubscriptionPurchase, EntryContext::Subscription { .. })
                | (EntryType::BonusClaim, EntryContext::Bonus { .. })
                | (EntryType::Withdrawal, EntryContext::Withdrawal { .. })
                | (EntryType::Refund, EntryContext::Refund { .. })
                | (EntryType::Reward, EntryContext::System { .. })
        )
    }
}

/// How the store should persist a draft
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    /// Apply the balance effect and persist as `Completed`
    #[default]
    Settle,
    /// Persist as `Pending` - external confirmation outstanding, no balance
    /// effect and no chain link until settled
    Hold,
    /// Apply the balance effect but persist as `Flagged` - used for
    /// partially-covered refunds that need manual review while the
    /// recoverable part is already reversed
    SettleFlagged,
    /// Persist as `Failed` for audit visibility - zero amount, no balance
    /// effect
    RecordFailure,
}

/// One immutable record of a single economic event.
///
/// # Invariants
/// - For completed entries: `balance_after = balance_before ± amount` per
///   the type's sign convention.
/// - `hash = SHA256(id, user_id, entry_type, amount, created_at,
///   previous_hash)` where `previous_hash` is the hash of the user's
///   previous *completed* entry, or `GENESIS_HASH`.
/// - Completed entries are immutable; corrections are new reversal entries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub user_id: UserId,
    pub counterparty_id: Option<UserId>,
    pub entry_type: EntryType,
    pub amount: Coins,
    pub balance_before: Coins,
    pub balance_after: Coins,
    pub source: FundSource,
    pub destination: FundDestination,
    /// The pool `balance_before`/`balance_after` refer to. Fixed at commit
    /// time; a stake fully covered by bonus coins settles on `Bonus`.
    pub pool: BalancePool,
    pub context: EntryContext,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
    /// Weighted fraud score 0-100, set when the entry was scored
    pub fraud_score: Option<u8>,
    pub risk_level: Option<RiskLevel>,
    /// Empty for entries that never joined the chain (pending, failed,
    /// cancelled, flagged-at-create)
    pub hash: String,
    pub previous_hash: String,
    pub idempotency_key: Option<String>,
    pub external_payment_id: Option<String>,
}

impl LedgerEntry {
    /// Whether this entry participates in the user's hash chain
    pub fn is_chained(&self) -> bool {
        self.status == EntryStatus::Completed || self.was_completed()
    }

    /// Flagged-by-review entries were completed first and keep their chain
    /// link; flagged-at-create entries never had one.
    fn was_completed(&self) -> bool {
        self.status == EntryStatus::Flagged && !self.hash.is_empty()
    }
}

/// Caller-supplied input for one ledger append.
///
/// Built with [`EntryDraft::new`], which fills the canonical fund flow for
/// the type; callers that receive source/destination from the outside can
/// override them and rely on validation to reject mismatches.
#[derive(Debug, Clone)]
pub struct EntryDraft {
    pub user_id: UserId,
    pub counterparty_id: Option<UserId>,
    pub entry_type: EntryType,
    pub amount: Coins,
    pub source: FundSource,
    pub destination: FundDestination,
    pub context: EntryContext,
    pub disposition: Disposition,
    pub fraud_score: Option<u8>,
    pub risk_level: Option<RiskLevel>,
    pub idempotency_key: Option<String>,
    pub external_payment_id: Option<String>,
}

impl EntryDraft {
    /// Create a draft with the canonical fund flow for the type
    pub fn new(
        user_id: impl Into<UserId>,
        entry_type: EntryType,
        amount: Coins,
        context: EntryContext,
    ) -> Self {
        let (source, destination) = entry_type.flow();
        Self {
            user_id: user_id.into(),
            counterparty_id: None,
            entry_type,
            amount,
            source,
            destination,
            context,
            disposition: Disposition::Settle,
            fraud_score: None,
            risk_level: None,
            idempotency_key: None,
            external_payment_id: None,
        }
    }

    pub fn counterparty(mut self, counterparty: impl Into<UserId>) -> Self {
        self.counterparty_id = Some(counterparty.into());
        self
    }

    /// Override the fund flow (validated against the type's table)
    pub fn with_flow(mut self, source: FundSource, destination: FundDestination) -> Self {
        self.source = source;
        self.destination = destination;
        self
    }

    pub fn disposition(mut self, disposition: Disposition) -> Self {
        self.disposition = disposition;
        self
    }

    pub fn scored(mut self, fraud_score: u8, risk_level: RiskLevel) -> Self {
        self.fraud_score = Some(fraud_score);
        self.risk_level = Some(risk_level);
        self
    }

    pub fn idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    pub fn external_payment_id(mut self, id: impl Into<String>) -> Self {
        self.external_payment_id = Some(id.into());
        self
    }
}
