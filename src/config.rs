//! Ledger configuration
//!
//! Loaded from an optional JSON file; every field has a default:
//! ```json
//! {
//!   "database": "remit.db",
//!   "busyTimeoutMs": 5000,
//!   "attemptTimeoutMs": 2000,
//!   "retry": { "maxAttempts": 8, "initialBackoffMs": 2, "maxBackoffMs": 100 },
//!   "seed": { "minCents": 100, "maxCents": 1000000 }
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::domain::Cents;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LedgerConfig {
    /// SQLite database file path
    pub database: String,
    /// How long a connection waits on a locked database before giving up
    pub busy_timeout_ms: u64,
    /// Upper bound for reading and checking both accounts in one transfer attempt
    pub attempt_timeout_ms: u64,
    pub retry: RetryPolicy,
    pub seed: SeedRange,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database: "remit.db".to_string(),
            busy_timeout_ms: 5_000,
            attempt_timeout_ms: 2_000,
            retry: RetryPolicy::default(),
            seed: SeedRange::default(),
        }
    }
}

/// Bounded retry for commits that lose a race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_backoff_ms: 2,
            max_backoff_ms: 100,
        }
    }
}

impl RetryPolicy {
    /// Delay before the retry that follows `attempt` (1-based).
    /// Doubles each time: 2, 4, 8, ... capped at `max_backoff_ms`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .initial_backoff_ms
            .saturating_mul(2u64.pow(exponent))
            .min(self.max_backoff_ms);
        Duration::from_millis(delay)
    }
}

/// Largest seed balance a config may ask for (100 billion in currency units).
/// Keeps balance sums far from `i64` overflow.
pub const MAX_SEED_CENTS: Cents = 10_000_000_000_000;

/// Range of the randomized balance every new account is seeded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SeedRange {
    pub min_cents: Cents,
    pub max_cents: Cents,
}

impl Default for SeedRange {
    fn default() -> Self {
        Self {
            min_cents: 100,
            max_cents: 1_000_000,
        }
    }
}

impl LedgerConfig {
    /// Config with defaults for a given database path.
    pub fn with_database(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Self::default()
        }
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            bail!("retry.maxAttempts must be at least 1");
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            bail!("retry.initialBackoffMs must not exceed retry.maxBackoffMs");
        }
        if self.attempt_timeout_ms == 0 {
            bail!("attemptTimeoutMs must be positive");
        }
        if self.seed.min_cents < 0 || self.seed.min_cents > self.seed.max_cents {
            bail!("seed range must satisfy 0 <= minCents <= maxCents");
        }
        if self.seed.max_cents > MAX_SEED_CENTS {
            bail!("seed.maxCents must not exceed {}", MAX_SEED_CENTS);
        }
        Ok(())
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(LedgerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: LedgerConfig =
            serde_json::from_str(r#"{ "retry": { "maxAttempts": 3 } }"#).unwrap();
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_backoff_ms, 2);
        assert_eq!(config.database, "remit.db");
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            initial_backoff_ms: 5,
            max_backoff_ms: 30,
        };
        assert_eq!(policy.backoff(1), Duration::from_millis(5));
        assert_eq!(policy.backoff(2), Duration::from_millis(10));
        assert_eq!(policy.backoff(3), Duration::from_millis(20));
        assert_eq!(policy.backoff(4), Duration::from_millis(30));
        assert_eq!(policy.backoff(40), Duration::from_millis(30));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = LedgerConfig::default();
        config.retry.max_attempts = 0;
        assert!(config.validate().is_err());

        let mut config = LedgerConfig::default();
        config.seed.min_cents = 10;
        config.seed.max_cents = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_caps_seed_balance() {
        let mut config = LedgerConfig::default();
        config.seed.max_cents = MAX_SEED_CENTS;
        assert!(config.validate().is_ok());

        config.seed.max_cents = i64::MAX;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("seed.maxCents"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("remit.json");
        std::fs::write(&path, r#"{ "database": "other.db", "attemptTimeoutMs": 50 }"#).unwrap();

        let config = LedgerConfig::load(&path).unwrap();
        assert_eq!(config.database, "other.db");
        assert_eq!(config.attempt_timeout(), Duration::from_millis(50));
    }
}
