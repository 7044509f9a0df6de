use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;

use crate::domain::{Account, BalanceAdjustment, Cents, UserId};

use super::store::key_order;
use super::{AccountStore, StoreError};

/// Single-node account store. One lock guards every account, so a batch is
/// validated and written without any other writer observing it half done.
#[derive(Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<UserId, Account>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an account. Returns false if the user already has one.
    pub fn insert(&self, account: Account) -> Result<bool, StoreError> {
        let mut accounts = self.lock()?;
        if accounts.contains_key(&account.user_id) {
            return Ok(false);
        }
        accounts.insert(account.user_id, account);
        Ok(true)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<UserId, Account>>, StoreError> {
        self.accounts
            .lock()
            .map_err(|_| StoreError::Backend(anyhow!("account store lock poisoned")))
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, user_id: UserId) -> Result<Account, StoreError> {
        self.lock()?
            .get(&user_id)
            .cloned()
            .ok_or(StoreError::NotFound(user_id))
    }

    async fn apply_atomically(
        &self,
        adjustments: &[BalanceAdjustment],
    ) -> Result<Vec<Account>, StoreError> {
        let mut accounts = self.lock()?;
        let now = Utc::now();

        // Stage every leg first; nothing is written unless all of them pass.
        let mut staged: HashMap<UserId, Account> = HashMap::new();
        let mut results: Vec<Option<Account>> = vec![None; adjustments.len()];

        for index in key_order(adjustments) {
            let adjustment = &adjustments[index];
            let current = match staged.get(&adjustment.user_id) {
                Some(account) => account.clone(),
                None => accounts
                    .get(&adjustment.user_id)
                    .cloned()
                    .ok_or(StoreError::NotFound(adjustment.user_id))?,
            };

            if !adjustment.precondition.admits(&current, adjustment.delta) {
                return Err(StoreError::PreconditionFailed(adjustment.user_id));
            }

            let mut next = current;
            next.balance += adjustment.delta;
            next.version += 1;
            next.updated_at = now;

            results[index] = Some(next.clone());
            staged.insert(adjustment.user_id, next);
        }

        accounts.extend(staged);
        Ok(results.into_iter().flatten().collect())
    }

    async fn total_balance(&self) -> Result<Cents, StoreError> {
        self.lock()?
            .values()
            .try_fold(0 as Cents, |total, account| total.checked_add(account.balance))
            .ok_or_else(|| StoreError::Backend(anyhow!("total balance overflows")))
    }
}
