use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::domain::{BalanceAdjustment, Cents, TransferReceipt, UserId};
use crate::storage::{AccountStore, StoreError};

use super::AppError;

/// Moves funds between two accounts as one all-or-nothing commit.
///
/// Each attempt reads both accounts and checks the business rules against
/// that snapshot within the attempt timeout, then commits the debit and credit through
/// [`AccountStore::apply_atomically`]. The debit carries the no-overdraft
/// precondition, so a balance that changed after the read makes the commit
/// fail instead of overdrawing; the attempt is then retried against fresh
/// state, up to the policy's limit.
pub struct TransferCoordinator<S: AccountStore> {
    store: Arc<S>,
    retry: RetryPolicy,
    attempt_timeout: Duration,
}

/// How one attempt ended when it did not commit.
enum AttemptError {
    /// Lost a race with another writer; safe to try again.
    Retry(StoreError),
    Fatal(AppError),
}

impl<S: AccountStore + 'static> TransferCoordinator<S> {
    pub fn new(store: Arc<S>, retry: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            store,
            retry,
            attempt_timeout,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Move `amount` cents from `sender` to `recipient`.
    pub async fn transfer(
        &self,
        sender: UserId,
        recipient: UserId,
        amount: Cents,
    ) -> Result<TransferReceipt, AppError> {
        if amount <= 0 {
            return Err(AppError::InvalidAmount(
                "Amount must be positive".to_string(),
            ));
        }
        if sender == recipient {
            return Err(AppError::SelfTransfer);
        }

        let max_attempts = self.retry.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            let checked =
                tokio::time::timeout(self.attempt_timeout, self.check(sender, recipient, amount))
                    .await;

            let outcome = match checked {
                Err(_) => {
                    warn!(%sender, %recipient, attempt, "transfer attempt timed out");
                    return Err(AppError::Timeout(self.attempt_timeout));
                }
                Ok(Err(err)) => Err(err),
                Ok(Ok(())) => self.commit(sender, recipient, amount).await,
            };

            match outcome {
                Ok((sender_balance, recipient_balance)) => {
                    let receipt = TransferReceipt {
                        id: Uuid::new_v4(),
                        sender,
                        recipient,
                        amount,
                        sender_balance,
                        recipient_balance,
                        attempts: attempt,
                        completed_at: Utc::now(),
                    };
                    info!(transfer_id = %receipt.id, %sender, %recipient, amount, attempt, "transfer committed");
                    return Ok(receipt);
                }
                Err(AttemptError::Fatal(err)) => {
                    debug!(%sender, %recipient, amount, error = %err, "transfer rejected");
                    return Err(err);
                }
                Err(AttemptError::Retry(err)) => {
                    if attempt == max_attempts {
                        break;
                    }
                    let delay = self.retry.backoff(attempt);
                    debug!(
                        %sender,
                        %recipient,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transfer commit conflicted, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }

        warn!(%sender, %recipient, attempts = max_attempts, "transfer gave up after repeated conflicts");
        Err(AppError::Conflict {
            attempts: max_attempts,
        })
    }

    /// Reads both accounts and checks the transfer against that snapshot.
    async fn check(
        &self,
        sender: UserId,
        recipient: UserId,
        amount: Cents,
    ) -> Result<(), AttemptError> {
        let sender_account = match self.store.get(sender).await {
            Ok(account) => account,
            Err(StoreError::NotFound(_)) => {
                return Err(AttemptError::Fatal(AppError::SenderNotFound(sender)));
            }
            Err(err) => return Err(Self::store_failure(err)),
        };

        if sender_account.balance < amount {
            return Err(AttemptError::Fatal(AppError::InsufficientBalance {
                balance: sender_account.balance,
                required: amount,
            }));
        }

        match self.store.get(recipient).await {
            Ok(_) => Ok(()),
            Err(StoreError::NotFound(_)) => {
                Err(AttemptError::Fatal(AppError::RecipientNotFound(recipient)))
            }
            Err(err) => Err(Self::store_failure(err)),
        }
    }

    /// Commits the debit and credit. Returns the committed balances of
    /// sender and recipient.
    ///
    /// The commit runs on its own task and is awaited to completion, so
    /// dropping the caller's future cannot separate a durable commit from
    /// its acknowledgement. Lock waits inside the store are bounded by the
    /// store itself (the SQLite busy timeout).
    async fn commit(
        &self,
        sender: UserId,
        recipient: UserId,
        amount: Cents,
    ) -> Result<(Cents, Cents), AttemptError> {
        let store = Arc::clone(&self.store);
        let legs = [
            BalanceAdjustment::debit(sender, amount),
            BalanceAdjustment::credit(recipient, amount),
        ];
        let committed = tokio::spawn(async move { store.apply_atomically(&legs).await })
            .await
            .map_err(|err| {
                AttemptError::Fatal(AppError::Database(anyhow::anyhow!(
                    "transfer commit task failed: {}",
                    err
                )))
            })?;

        match committed {
            Ok(accounts) => match accounts.as_slice() {
                [debited, credited] => Ok((debited.balance, credited.balance)),
                _ => Err(AttemptError::Fatal(AppError::Database(anyhow::anyhow!(
                    "store returned {} accounts for a two-leg transfer",
                    accounts.len()
                )))),
            },
            Err(StoreError::NotFound(id)) if id == sender => {
                Err(AttemptError::Fatal(AppError::SenderNotFound(sender)))
            }
            Err(StoreError::NotFound(_)) => {
                Err(AttemptError::Fatal(AppError::RecipientNotFound(recipient)))
            }
            Err(err) => Err(Self::store_failure(err)),
        }
    }

    fn store_failure(err: StoreError) -> AttemptError {
        if err.is_retryable() {
            AttemptError::Retry(err)
        } else {
            AttemptError::Fatal(err.into())
        }
    }
}
