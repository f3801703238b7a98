//! Ledger configuration.
//!
//! Values come from defaults, then environment variables, then CLI flags.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// What happens to a journaled withdrawal/transfer when the funds check fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PendingPolicy {
    /// Mark the record Failed before reporting insufficient funds.
    #[default]
    MarkFailed,
    /// Leave the record Pending (legacy behaviour).
    LeavePending,
}

impl PendingPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingPolicy::MarkFailed => "mark-failed",
            PendingPolicy::LeavePending => "leave-pending",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mark-failed" => Some(PendingPolicy::MarkFailed),
            "leave-pending" => Some(PendingPolicy::LeavePending),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// SQLite database file
    pub database_path: PathBuf,

    /// Maximum connections in the pool
    pub max_connections: u32,

    /// Bounded wait for a per-wallet lock
    pub lock_timeout: Duration,

    /// Bounded wait for SQLite's write lock
    pub busy_timeout: Duration,

    pub pending_policy: PendingPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("wallet-ledger.db"),
            max_connections: 5,
            lock_timeout: Duration::from_secs(5),
            busy_timeout: Duration::from_secs(5),
            pending_policy: PendingPolicy::default(),
        }
    }
}

impl LedgerConfig {
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            ..Default::default()
        }
    }

    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(path) = env::var("WALLET_LEDGER_DATABASE") {
            config.database_path = PathBuf::from(path);
        }

        if let Ok(value) = env::var("WALLET_LEDGER_MAX_CONNECTIONS") {
            config.max_connections = value
                .parse()
                .map_err(|_| ConfigError::InvalidValue("WALLET_LEDGER_MAX_CONNECTIONS"))?;
        }

        if let Ok(value) = env::var("WALLET_LEDGER_LOCK_TIMEOUT_MS") {
            config.lock_timeout = parse_millis(&value, "WALLET_LEDGER_LOCK_TIMEOUT_MS")?;
        }

        if let Ok(value) = env::var("WALLET_LEDGER_BUSY_TIMEOUT_MS") {
            config.busy_timeout = parse_millis(&value, "WALLET_LEDGER_BUSY_TIMEOUT_MS")?;
        }

        if let Ok(value) = env::var("WALLET_LEDGER_PENDING_POLICY") {
            config.pending_policy = PendingPolicy::from_str(&value)
                .ok_or(ConfigError::InvalidValue("WALLET_LEDGER_PENDING_POLICY"))?;
        }

        Ok(config)
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_pending_policy(mut self, policy: PendingPolicy) -> Self {
        self.pending_policy = policy;
        self
    }
}

fn parse_millis(value: &str, name: &'static str) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidValue(name))
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
