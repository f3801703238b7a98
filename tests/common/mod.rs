// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use std::time::Duration;

use anyhow::Result;
use rust_decimal::Decimal;
use tempfile::TempDir;
use wallet_ledger::application::LedgerEngine;
use wallet_ledger::config::LedgerConfig;
use wallet_ledger::domain::{BankRef, Currency, Wallet};

/// Config pointing at a fresh database inside the temp dir
pub fn test_config(temp_dir: &TempDir) -> LedgerConfig {
    LedgerConfig::new(temp_dir.path().join("test.db")).with_lock_timeout(Duration::from_secs(10))
}

/// Helper to create a test engine with a temporary database
pub async fn test_engine() -> Result<(LedgerEngine, TempDir)> {
    let temp_dir = TempDir::new()?;
    let engine = LedgerEngine::init(test_config(&temp_dir)).await?;
    Ok((engine, temp_dir))
}

/// Helper to create a test engine with a custom config
pub async fn test_engine_with(
    configure: impl FnOnce(LedgerConfig) -> LedgerConfig,
) -> Result<(LedgerEngine, TempDir)> {
    let temp_dir = TempDir::new()?;
    let engine = LedgerEngine::init(configure(test_config(&temp_dir))).await?;
    Ok((engine, temp_dir))
}

pub fn bank() -> BankRef {
    BankRef::new("1234567890", "0800")
}

/// Create a wallet and fund it with an initial deposit
pub async fn funded_wallet(
    engine: &LedgerEngine,
    name: &str,
    currency: Currency,
    amount: Decimal,
) -> Result<Wallet> {
    let wallet = engine.create_wallet(name, currency).await?;
    if amount > Decimal::ZERO {
        engine.deposit(wallet.id, currency, amount, bank()).await?;
    }
    Ok(engine.get_wallet(wallet.id).await?)
}

/// Make every balance write fail, simulating a storage fault mid-operation
pub async fn break_balance_writes(engine: &LedgerEngine) -> Result<()> {
    sqlx::raw_sql(
        r#"
        CREATE TRIGGER fail_balance_writes BEFORE UPDATE OF balance ON wallets
        BEGIN
            SELECT RAISE(ABORT, 'balance writes disabled');
        END;
        "#,
    )
    .execute(engine.database().pool())
    .await?;
    Ok(())
}
