//! Balance accounts with optimistic version control
//!
//! A `BalanceAccount` is the mutable per-user projection of the ledger:
//! withdrawable balance, bonus balance, lifetime totals, and a monotonic
//! version token. The only mutation path is `Accounts::apply_delta`, a
//! compare-and-swap that the store calls from inside its commit section.

use chrono::{DateTime, Utc};
use glowcast_core::{Coins, UserId};
use glowcast_ledger::BalancePool;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors from account mutation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccountError {
    #[error("Stale version for {user_id}: expected {expected}, actual {actual}")]
    StaleVersion {
        user_id: UserId,
        expected: u64,
        actual: u64,
    },

    #[error("Balance underflow for {user_id}: {available} available, {required} required")]
    Underflow {
        user_id: UserId,
        available: Coins,
        required: Coins,
    },

    #[error("Balance overflow for {user_id}")]
    Overflow { user_id: UserId },
}

/// Per-user balance projection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceAccount {
    pub user_id: UserId,
    /// Withdrawable coin balance
    pub balance: Coins,
    /// Non-withdrawable bonus balance
    pub bonus_balance: Coins,
    pub total_earned: Coins,
    pub total_spent: Coins,
    /// Monotonic token for optimistic concurrency
    pub version: u64,
    pub last_updated: DateTime<Utc>,
}

impl BalanceAccount {
    /// Fresh account, created on a user's first ledger write
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            balance: Coins::ZERO,
            bonus_balance: Coins::ZERO,
            total_earned: Coins::ZERO,
            total_spent: Coins::ZERO,
            version: 0,
            last_updated: Utc::now(),
        }
    }

    pub fn snapshot(&self) -> BalanceSnapshot {
        BalanceSnapshot {
            balance: self.balance,
            bonus_balance: self.bonus_balance,
            version: self.version,
        }
    }
}

/// Read-only view of an account, as returned by `get_balance`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    pub balance: Coins,
    pub bonus_balance: Coins,
    pub version: u64,
}

impl BalanceSnapshot {
    /// Snapshot of a user with no account yet
    pub fn empty() -> Self {
        Self {
            balance: Coins::ZERO,
            bonus_balance: Coins::ZERO,
            version: 0,
        }
    }
}

/// Signed change to one balance pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PoolDelta {
    #[default]
    Unchanged,
    Credit(Coins),
    Debit(Coins),
}

/// Atomic multi-field change to one account
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountDelta {
    pub balance: PoolDelta,
    pub bonus: PoolDelta,
}

impl AccountDelta {
    /// Delta affecting a single pool
    pub fn on_pool(pool: BalancePool, delta: PoolDelta) -> Self {
        match pool {
            BalancePool::Withdrawable => Self {
                balance: delta,
                ..Self::default()
            },
            BalancePool::Bonus => Self {
                bonus: delta,
                ..Self::default()
            },
        }
    }
}

/// All balance accounts, keyed uniquely by user id.
///
/// Owned by the store; never exposed mutably outside it.
#[derive(Debug, Default)]
pub struct Accounts {
    accounts: HashMap<UserId, BalanceAccount>,
}

impl Accounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: &UserId) -> Option<&BalanceAccount> {
        self.accounts.get(user_id)
    }

    /// Snapshot for a user; empty if no account exists yet
    pub fn snapshot(&self, user_id: &UserId) -> BalanceSnapshot {
        self.accounts
            .get(user_id)
            .map(BalanceAccount::snapshot)
            .unwrap_or_else(BalanceSnapshot::empty)
    }

    /// Compare-and-swap balance mutation - the only mutation path.
    ///
    /// Creates the account on first write. Fails with `StaleVersion` if the
    /// account's version no longer matches `expected_version`; the caller
    /// (the store's append loop) retries with a fresh snapshot. Returns the
    /// new version. Crate-private: nothing outside the store commits
    /// balance changes.
    pub(crate) fn apply_delta(
        &mut self,
        user_id: &UserId,
        delta: AccountDelta,
        expected_version: u64,
    ) -> Result<u64, AccountError> {
        let account = self
            .accounts
            .entry(user_id.clone())
            .or_insert_with(|| BalanceAccount::new(user_id.clone()));

        if account.version != expected_version {
            return Err(AccountError::StaleVersion {
                user_id: user_id.clone(),
                expected: expected_version,
                actual: account.version,
            });
        }

        let balance = apply_pool(user_id, account.balance, delta.balance)?;
        let bonus_balance = apply_pool(user_id, account.bonus_balance, delta.bonus)?;

        let (earned, spent) = delta_totals(delta);
        let total_earned = account
            .total_earned
            .checked_add(earned)
            .ok_or(AccountError::Overflow {
                user_id: user_id.clone(),
            })?;
        let total_spent = account
            .total_spent
            .checked_add(spent)
            .ok_or(AccountError::Overflow {
                user_id: user_id.clone(),
            })?;

        account.balance = balance;
        account.bonus_balance = bonus_balance;
        account.total_earned = total_earned;
        account.total_spent = total_spent;
        account.version += 1;
        account.last_updated = Utc::now();

        Ok(account.version)
    }

    /// Number of accounts (for CLI / diagnostics)
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

fn apply_pool(user_id: &UserId, current: Coins, delta: PoolDelta) -> Result<Coins, AccountError> {
    match delta {
        PoolDelta::Unchanged => Ok(current),
        PoolDelta::Credit(amount) => {
            current
                .checked_add(amount)
                .ok_or_else(|| AccountError::Overflow {
                    user_id: user_id.clone(),
                })
        }
        PoolDelta::Debit(amount) => {
            current
                .checked_sub(amount)
                .ok_or_else(|| AccountError::Underflow {
                    user_id: user_id.clone(),
                    available: current,
                    required: amount,
                })
        }
    }
}

fn delta_totals(delta: AccountDelta) -> (Coins, Coins) {
    let mut earned = Coins::ZERO;
    let mut spent = Coins::ZERO;
    for pool_delta in [delta.balance, delta.bonus] {
        match pool_delta {
            PoolDelta::Credit(amount) => earned = earned.checked_add(amount).unwrap_or(earned),
            PoolDelta::Debit(amount) => spent = spent.checked_add(amount).unwrap_or(spent),
            PoolDelta::Unchanged => {}
        }
    }
    (earned, spent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> UserId {
        UserId::new("alice")
    }

    #[test]
    fn test_first_write_creates_account() {
        let mut accounts = Accounts::new();
        let version = accounts
            .apply_delta(
                &user(),
                AccountDelta {
                    balance: PoolDelta::Credit(Coins::new(100)),
                    ..Default::default()
                },
                0,
            )
            .unwrap();

        assert_eq!(version, 1);
        let account = accounts.get(&user()).unwrap();
        assert_eq!(account.balance, Coins::new(100));
        assert_eq!(account.total_earned, Coins::new(100));
    }

    #[test]
    fn test_stale_version_rejected() {
        let mut accounts = Accounts::new();
        accounts
            .apply_delta(
                &user(),
                AccountDelta {
                    balance: PoolDelta::Credit(Coins::new(100)),
                    ..Default::default()
                },
                0,
            )
            .unwrap();

        // Second writer still holds version 0
        let result = accounts.apply_delta(
            &user(),
            AccountDelta {
                balance: PoolDelta::Debit(Coins::new(50)),
                ..Default::default()
            },
            0,
        );
        assert!(matches!(result, Err(AccountError::StaleVersion { .. })));
    }

    #[test]
    fn test_debit_underflow_rejected() {
        let mut accounts = Accounts::new();
        let result = accounts.apply_delta(
            &user(),
            AccountDelta {
                balance: PoolDelta::Debit(Coins::new(50)),
                ..Default::default()
            },
            0,
        );
        assert!(matches!(result, Err(AccountError::Underflow { .. })));
    }

    #[test]
    fn test_totals_track_both_pools() {
        let mut accounts = Accounts::new();
        accounts
            .apply_delta(
                &user(),
                AccountDelta {
                    bonus: PoolDelta::Credit(Coins::new(30)),
                    ..Default::default()
                },
                0,
            )
            .unwrap();
        accounts
            .apply_delta(
                &user(),
                AccountDelta {
                    bonus: PoolDelta::Debit(Coins::new(10)),
                    ..Default::default()
                },
                1,
            )
            .unwrap();

        let account = accounts.get(&user()).unwrap();
        assert_eq!(account.bonus_balance, Coins::new(20));
        assert_eq!(account.total_earned, Coins::new(30));
        assert_eq!(account.total_spent, Coins::new(10));
        assert_eq!(account.version, 2);
    }
}
