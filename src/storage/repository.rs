use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;
use uuid::Uuid;

use crate::domain::{Account, BalanceAdjustment, Cents, Precondition, User, UserId};

use super::store::key_order;
use super::{AccountStore, MIGRATION_001_INITIAL, StoreError};

/// Maximum pooled connections. Writers still serialize inside SQLite.
const MAX_CONNECTIONS: u32 = 8;

/// Repository for persisting users and their accounts in SQLite.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the SQLite database at `path` in WAL mode.
    /// With `create` set, the file is created if it doesn't exist.
    pub async fn connect(path: &str, busy_timeout: Duration, create: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to database {}", path))?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect, creating it if needed, then migrate).
    pub async fn init(path: &str, busy_timeout: Duration) -> Result<Self> {
        let repo = Self::connect(path, busy_timeout, true).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // User operations
    // ========================

    /// Insert a user together with their account in one transaction, so a
    /// user never exists without exactly one account.
    /// Returns false if the username is already taken.
    pub async fn create_user_with_account(&self, user: &User, account: &Account) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("Failed to begin signup")?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO users (id, username, password_hash, first_name, last_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.created_at.to_rfc3339())
        .bind(user.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await;

        match inserted {
            Ok(_) => {}
            Err(sqlx::Error::Database(err)) if err.is_unique_violation() => return Ok(false),
            Err(err) => return Err(err).context("Failed to save user"),
        }

        sqlx::query(
            r#"
            INSERT INTO accounts (user_id, balance_cents, version, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.user_id.to_string())
        .bind(account.balance)
        .bind(account.version)
        .bind(account.created_at.to_rfc3339())
        .bind(account.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("Failed to save account")?;

        tx.commit().await.context("Failed to commit signup")?;
        Ok(true)
    }

    /// Get a user by ID.
    pub async fn get_user(&self, id: UserId) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, first_name, last_name, created_at, updated_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Get a user by username.
    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, password_hash, first_name, last_name, created_at, updated_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by username")?;

        row.as_ref().map(Self::row_to_user).transpose()
    }

    /// Persist changed profile fields (names, password hash).
    pub async fn update_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET password_hash = ?, first_name = ?, last_name = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&user.password_hash)
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(user.updated_at.to_rfc3339())
        .bind(user.id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update user")?;
        Ok(())
    }

    /// Users whose first or last name contains `filter`. An empty filter
    /// matches everyone.
    pub async fn search_users(&self, filter: &str) -> Result<Vec<User>> {
        let rows = sqlx::query(
            r#"
            SELECT id, username, password_hash, first_name, last_name, created_at, updated_at
            FROM users
            WHERE ? = '' OR instr(first_name, ?) > 0 OR instr(last_name, ?) > 0
            ORDER BY username
            "#,
        )
        .bind(filter)
        .bind(filter)
        .bind(filter)
        .fetch_all(&self.pool)
        .await
        .context("Failed to search users")?;

        rows.iter().map(Self::row_to_user).collect()
    }

    fn row_to_user(row: &SqliteRow) -> Result<User> {
        let id_str: String = row.get("id");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(User {
            id: Uuid::parse_str(&id_str).context("Invalid user ID")?,
            username: row.get("username"),
            password_hash: row.get("password_hash"),
            first_name: row.get("first_name"),
            last_name: row.get("last_name"),
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
            updated_at: parse_timestamp(&updated_at_str).context("Invalid updated_at timestamp")?,
        })
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let user_id_str: String = row.get("user_id");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(Account {
            user_id: Uuid::parse_str(&user_id_str).context("Invalid account user ID")?,
            balance: row.get("balance_cents"),
            version: row.get("version"),
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
            updated_at: parse_timestamp(&updated_at_str).context("Invalid updated_at timestamp")?,
        })
    }
}

#[async_trait]
impl AccountStore for Repository {
    async fn get(&self, user_id: UserId) -> Result<Account, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT user_id, balance_cents, version, created_at, updated_at
            FROM accounts
            WHERE user_id = ?
            "#,
        )
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        match row {
            Some(row) => Ok(Self::row_to_account(&row)?),
            None => Err(StoreError::NotFound(user_id)),
        }
    }

    async fn apply_atomically(
        &self,
        adjustments: &[BalanceAdjustment],
    ) -> Result<Vec<Account>, StoreError> {
        // Dropping `tx` on any early return rolls every leg back.
        let mut tx = self.pool.begin().await.map_err(classify)?;
        let now = Utc::now().to_rfc3339();
        let mut results: Vec<Option<Account>> = vec![None; adjustments.len()];

        for index in key_order(adjustments) {
            let adjustment = &adjustments[index];
            let user_id = adjustment.user_id.to_string();
            let expected_version = match adjustment.precondition {
                Precondition::NoOverdraft => None,
                Precondition::Version(version) => Some(version),
            };

            // Check and write in one statement: the row is never read outside
            // the write lock.
            let row = sqlx::query(
                r#"
                UPDATE accounts
                SET balance_cents = balance_cents + ?, version = version + 1, updated_at = ?
                WHERE user_id = ?
                  AND balance_cents + ? >= 0
                  AND (? IS NULL OR version = ?)
                RETURNING user_id, balance_cents, version, created_at, updated_at
                "#,
            )
            .bind(adjustment.delta)
            .bind(&now)
            .bind(&user_id)
            .bind(adjustment.delta)
            .bind(expected_version)
            .bind(expected_version)
            .fetch_optional(&mut *tx)
            .await
            .map_err(classify)?;

            match row {
                Some(row) => results[index] = Some(Self::row_to_account(&row)?),
                None => {
                    let exists = sqlx::query("SELECT 1 FROM accounts WHERE user_id = ?")
                        .bind(&user_id)
                        .fetch_optional(&mut *tx)
                        .await
                        .map_err(classify)?
                        .is_some();
                    debug!(user_id = %adjustment.user_id, exists, "balance adjustment rejected");
                    return Err(if exists {
                        StoreError::PreconditionFailed(adjustment.user_id)
                    } else {
                        StoreError::NotFound(adjustment.user_id)
                    });
                }
            }
        }

        tx.commit().await.map_err(classify)?;
        Ok(results.into_iter().flatten().collect())
    }

    async fn total_balance(&self) -> Result<Cents, StoreError> {
        let row = sqlx::query("SELECT COALESCE(SUM(balance_cents), 0) as total FROM accounts")
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(row.get("total"))
    }
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

/// Lock contention (SQLITE_BUSY, SQLITE_LOCKED and their extended codes) is a
/// retryable conflict; anything else is a backend failure.
fn classify(err: sqlx::Error) -> StoreError {
    if is_contention(&err) {
        StoreError::Conflict(err.to_string())
    } else {
        StoreError::Backend(anyhow::Error::new(err).context("Account store query failed"))
    }
}

fn is_contention(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let primary_code = db_err
                .code()
                .and_then(|code| code.parse::<i32>().ok())
                .map(|code| code & 0xff);
            matches!(primary_code, Some(5) | Some(6))
                || db_err.message().to_lowercase().contains("database is locked")
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}
