use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool};

use crate::config::LedgerConfig;

use super::{MIGRATION_001_INITIAL, TransactionLog, WalletStore};

/// Shared SQLite connection pool backing both the wallet store and the
/// transaction log. Both must be built from the same `Database` so that a
/// balance write and a status write can share one SQL transaction.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open the database file described by the config.
    /// With `create` set, a missing file is created.
    pub async fn connect(config: &LedgerConfig, create: bool) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(create)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(config.busy_timeout)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .with_context(|| {
                format!(
                    "Failed to connect to database {}",
                    config.database_path.display()
                )
            })?;

        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to run more than once.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a database (connect + migrate), creating it if needed.
    pub async fn init(config: &LedgerConfig) -> Result<Self> {
        let db = Self::connect(config, true).await?;
        db.migrate().await?;
        Ok(db)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn wallet_store(&self) -> WalletStore {
        WalletStore::new(self.clone())
    }

    pub fn transaction_log(&self) -> TransactionLog {
        TransactionLog::new(self.clone())
    }

    /// Start a SQL transaction on the shared pool.
    pub(crate) async fn begin(&self) -> Result<sqlx::Transaction<'static, Sqlite>> {
        self.pool
            .begin()
            .await
            .context("Failed to begin database transaction")
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
