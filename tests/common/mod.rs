// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use remit::application::LedgerService;
use remit::config::{LedgerConfig, RetryPolicy, SeedRange};
use remit::domain::{Cents, NewUser, Precondition, Principal, UserId};
use remit::storage::{AccountStore, Repository};
use tempfile::TempDir;

pub const TEST_PASSWORD: &str = "password1";

/// A ledger on a temporary database, plus a second handle on the same file
/// used to fund accounts with exact balances.
pub struct TestLedger {
    pub service: Arc<LedgerService>,
    pub store: Repository,
    pub config: LedgerConfig,
    _temp_dir: TempDir,
}

/// Config for tests: accounts open empty and contention is retried
/// generously so stress tests measure correctness, not the retry budget.
pub fn test_config(db_path: &str) -> LedgerConfig {
    let mut config = LedgerConfig::with_database(db_path);
    config.seed = SeedRange {
        min_cents: 0,
        max_cents: 0,
    };
    config.retry = RetryPolicy {
        max_attempts: 50,
        initial_backoff_ms: 1,
        max_backoff_ms: 20,
    };
    config.attempt_timeout_ms = 10_000;
    config
}

impl TestLedger {
    pub async fn new() -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let db_path = temp_dir.path().join("test.db");
        let config = test_config(db_path.to_str().unwrap());
        Self::with_config(config, temp_dir).await
    }

    pub async fn with_config(config: LedgerConfig, temp_dir: TempDir) -> Result<Self> {
        let service = LedgerService::init(&config).await?;
        let store = Repository::connect(&config.database, config.busy_timeout(), false).await?;
        Ok(Self {
            service: Arc::new(service),
            store,
            config,
            _temp_dir: temp_dir,
        })
    }

    /// Sign up a user and bring their account to exactly `balance`.
    pub async fn user(&self, username: &str, balance: Cents) -> Result<(Principal, UserId)> {
        let result = self
            .service
            .signup(NewUser::new(username, TEST_PASSWORD, "Test", username))
            .await?;
        let user_id = result.user.id;

        let current = self.store.get(user_id).await?.balance;
        if balance != current {
            self.store
                .adjust_balance(user_id, balance - current, Precondition::NoOverdraft)
                .await?;
        }
        Ok((Principal::assume(user_id), user_id))
    }

    pub async fn balance(&self, user_id: UserId) -> Result<Cents> {
        Ok(self.service.get_balance(user_id).await?.balance)
    }
}
