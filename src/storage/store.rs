use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{Account, BalanceAdjustment, Cents, Precondition, UserId};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Account not found: {0}")]
    NotFound(UserId),

    #[error("Precondition failed for account {0}")]
    PreconditionFailed(UserId),

    #[error("Store is busy: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    /// True for failures caused by a concurrent writer, where running the same
    /// operation again can succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            StoreError::PreconditionFailed(_) | StoreError::Conflict(_)
        )
    }
}

/// Durable balance storage with atomic conditional updates.
///
/// Every adjustment keeps `balance >= 0`; an adjustment that would break that
/// rule, or its own precondition, fails with `PreconditionFailed` and changes
/// nothing.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Get the account owned by a user.
    async fn get(&self, user_id: UserId) -> Result<Account, StoreError>;

    /// Apply several adjustments as one all-or-nothing commit.
    ///
    /// Adjustments are applied in ascending user id order. The returned
    /// accounts are in the order the adjustments were given.
    async fn apply_atomically(
        &self,
        adjustments: &[BalanceAdjustment],
    ) -> Result<Vec<Account>, StoreError>;

    /// Sum of every account balance.
    async fn total_balance(&self) -> Result<Cents, StoreError>;

    /// Apply `balance += delta` if `precondition` holds at commit time.
    async fn adjust_balance(
        &self,
        user_id: UserId,
        delta: Cents,
        precondition: Precondition,
    ) -> Result<Account, StoreError> {
        let adjustment = BalanceAdjustment::new(user_id, delta, precondition);
        let mut accounts = self.apply_atomically(&[adjustment]).await?;
        accounts
            .pop()
            .ok_or_else(|| StoreError::Backend(anyhow::anyhow!("store returned no account")))
    }
}

/// Stable application order for a batch of adjustments.
pub(crate) fn key_order(adjustments: &[BalanceAdjustment]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..adjustments.len()).collect();
    order.sort_by_key(|&index| adjustments[index].user_id);
    order
}
