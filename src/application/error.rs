use std::time::Duration;

use thiserror::Error;

use crate::domain::{Cents, UserId};
use crate::storage::StoreError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Account not found for user {0}")]
    AccountNotFound(UserId),

    #[error("Sender account not found: {0}")]
    SenderNotFound(UserId),

    #[error("Recipient account not found: {0}")]
    RecipientNotFound(UserId),

    #[error("Insufficient balance: balance {balance}, required {required}")]
    InsufficientBalance { balance: Cents, required: Cents },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Cannot transfer to your own account")]
    SelfTransfer,

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Username already taken: {0}")]
    UsernameTaken(String),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Transfer did not commit after {attempts} attempts due to concurrent updates")]
    Conflict { attempts: u32 },

    #[error("Transfer attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl AppError {
    /// Only contention failures are worth retrying; everything else will fail
    /// the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict { .. })
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(user_id) => AppError::AccountNotFound(user_id),
            StoreError::PreconditionFailed(_) | StoreError::Conflict(_) => {
                AppError::Conflict { attempts: 1 }
            }
            StoreError::Backend(err) => AppError::Database(err),
        }
    }
}
