use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info};

use crate::config::{LedgerConfig, SeedRange};
use crate::domain::{
    Account, Cents, NewUser, Principal, ProfileUpdate, TransferReceipt, User, UserId, UserProfile,
};
use crate::storage::{AccountStore, Repository, StoreError};

use super::credentials::{hash_password, verify_password};
use super::{AppError, TransferCoordinator};

/// Application service providing the operations the rest of the application
/// consumes: signup, authentication, profiles, balances and transfers.
pub struct LedgerService {
    repo: Arc<Repository>,
    coordinator: TransferCoordinator<Repository>,
    seed: SeedRange,
}

/// Balance of a single account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceEntry {
    pub user_id: UserId,
    pub balance: Cents,
}

/// Result of a successful signup
pub struct SignupResult {
    pub user: UserProfile,
    pub account: Account,
}

impl LedgerService {
    /// Create a new ledger service over an opened repository.
    pub fn new(repo: Repository, config: &LedgerConfig) -> Self {
        let repo = Arc::new(repo);
        let coordinator =
            TransferCoordinator::new(Arc::clone(&repo), config.retry, config.attempt_timeout());
        Self {
            repo,
            coordinator,
            seed: config.seed,
        }
    }

    /// Create the database if needed and run migrations.
    pub async fn init(config: &LedgerConfig) -> Result<Self, AppError> {
        config
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let repo = Repository::init(&config.database, config.busy_timeout()).await?;
        Ok(Self::new(repo, config))
    }

    /// Connect to an existing database.
    pub async fn connect(config: &LedgerConfig) -> Result<Self, AppError> {
        config
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;
        let repo = Repository::connect(&config.database, config.busy_timeout(), false).await?;
        Ok(Self::new(repo, config))
    }

    // ========================
    // User operations
    // ========================

    /// Register a user and open their account with a randomized seed balance.
    pub async fn signup(&self, new_user: NewUser) -> Result<SignupResult, AppError> {
        new_user.validate().map_err(AppError::Validation)?;

        if self
            .repo
            .get_user_by_username(&new_user.username)
            .await?
            .is_some()
        {
            return Err(AppError::UsernameTaken(new_user.username));
        }

        let password_hash = hash_in_background(new_user.password).await?;
        let user = User::new(
            new_user.username,
            password_hash,
            new_user.first_name.trim().to_string(),
            new_user.last_name.trim().to_string(),
        );
        let account = Account::open(user.id, self.seed_balance());

        // The username may have been claimed between the check and the insert.
        if !self.repo.create_user_with_account(&user, &account).await? {
            return Err(AppError::UsernameTaken(user.username));
        }

        info!(user_id = %user.id, username = %user.username, "user signed up");
        Ok(SignupResult {
            user: user.profile(),
            account,
        })
    }

    /// Verify a username/password pair and return the caller's principal.
    /// Unknown users and wrong passwords fail the same way.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Principal, AppError> {
        let Some(user) = self.repo.get_user_by_username(username).await? else {
            debug!(username, "sign in for unknown user");
            return Err(AppError::InvalidCredentials);
        };

        let password = password.to_string();
        let stored_hash = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
            .await
            .map_err(|e| anyhow::anyhow!("Password verification task failed: {}", e))??;

        if !valid {
            debug!(username, "sign in with wrong password");
            return Err(AppError::InvalidCredentials);
        }
        Ok(Principal::assume(user.id))
    }

    /// Profile of the calling user.
    pub async fn me(&self, principal: &Principal) -> Result<UserProfile, AppError> {
        Ok(self.load_user(principal.user_id()).await?.profile())
    }

    /// Change the caller's names and/or password.
    pub async fn update_profile(
        &self,
        principal: &Principal,
        update: ProfileUpdate,
    ) -> Result<UserProfile, AppError> {
        update.validate().map_err(AppError::Validation)?;
        let mut user = self.load_user(principal.user_id()).await?;

        if let Some(first_name) = update.first_name {
            user.first_name = first_name.trim().to_string();
        }
        if let Some(last_name) = update.last_name {
            user.last_name = last_name.trim().to_string();
        }
        if let Some(password) = update.password {
            user.password_hash = hash_in_background(password).await?;
        }
        user.updated_at = Utc::now();

        self.repo.update_user(&user).await?;
        info!(user_id = %user.id, "profile updated");
        Ok(user.profile())
    }

    /// Users whose first or last name contains `filter`.
    pub async fn find_users(&self, filter: &str) -> Result<Vec<UserProfile>, AppError> {
        let users = self.repo.search_users(filter.trim()).await?;
        Ok(users.iter().map(User::profile).collect())
    }

    async fn load_user(&self, user_id: UserId) -> Result<User, AppError> {
        self.repo
            .get_user(user_id)
            .await?
            .ok_or_else(|| AppError::UserNotFound(user_id.to_string()))
    }

    // ========================
    // Balance operations
    // ========================

    /// Current balance of a user's account.
    pub async fn get_balance(&self, user_id: UserId) -> Result<BalanceEntry, AppError> {
        match self.repo.get(user_id).await {
            Ok(account) => Ok(BalanceEntry {
                user_id,
                balance: account.balance,
            }),
            Err(StoreError::NotFound(_)) => Err(AppError::AccountNotFound(user_id)),
            Err(err) => Err(err.into()),
        }
    }

    /// Move funds from the caller's account to `recipient`.
    pub async fn transfer(
        &self,
        principal: &Principal,
        recipient: UserId,
        amount: Cents,
    ) -> Result<TransferReceipt, AppError> {
        self.coordinator
            .transfer(principal.user_id(), recipient, amount)
            .await
    }

    /// Sum of every balance in the ledger.
    pub async fn total_balance(&self) -> Result<Cents, AppError> {
        Ok(self.repo.total_balance().await?)
    }

    fn seed_balance(&self) -> Cents {
        rand::thread_rng().gen_range(self.seed.min_cents..=self.seed.max_cents)
    }
}

/// Argon2 is deliberately slow; keep it off the async workers.
async fn hash_in_background(password: String) -> Result<String, AppError> {
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| anyhow::anyhow!("Password hashing task failed: {}", e))??;
    Ok(hash)
}
