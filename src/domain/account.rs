use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Cents, UserId};

/// The balance record owned by exactly one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: UserId,
    /// Balance in cents, never negative
    pub balance: Cents,
    /// Bumped on every balance mutation, used for compare-and-swap
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Open an account with a seed balance.
    pub fn open(user_id: UserId, balance: Cents) -> Self {
        assert!(balance >= 0, "Seed balance must not be negative");
        let now = Utc::now();
        Self {
            user_id,
            balance,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// What must hold for a balance adjustment to commit, on top of the
/// non-negative balance rule that every adjustment obeys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// Only the resulting balance must not go below zero.
    NoOverdraft,
    /// The account must still be at this version.
    Version(i64),
}

impl Precondition {
    /// Whether an adjustment by `delta` may be applied to `account`.
    pub fn admits(&self, account: &Account, delta: Cents) -> bool {
        let Some(new_balance) = account.balance.checked_add(delta) else {
            return false;
        };
        if new_balance < 0 {
            return false;
        }
        match self {
            Precondition::NoOverdraft => true,
            Precondition::Version(expected) => account.version == *expected,
        }
    }
}

/// One leg of an atomic multi-account update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceAdjustment {
    pub user_id: UserId,
    pub delta: Cents,
    pub precondition: Precondition,
}

impl BalanceAdjustment {
    pub fn new(user_id: UserId, delta: Cents, precondition: Precondition) -> Self {
        Self {
            user_id,
            delta,
            precondition,
        }
    }

    pub fn debit(user_id: UserId, amount: Cents) -> Self {
        Self::new(user_id, -amount, Precondition::NoOverdraft)
    }

    pub fn credit(user_id: UserId, amount: Cents) -> Self {
        Self::new(user_id, amount, Precondition::NoOverdraft)
    }
}
