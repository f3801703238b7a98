use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::domain::{Currency, Wallet, WalletId};
use crate::error::LedgerError;

use super::Database;

const WALLET_COLUMNS: &str = "id, name, currency, balance, created_at, updated_at";

/// Durable collection of wallets with a unique-name index.
#[derive(Debug, Clone)]
pub struct WalletStore {
    db: Database,
}

impl WalletStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Create a wallet with a zero balance.
    /// Fails with `NameConflict` if the name is already taken.
    pub async fn create(&self, name: &str, currency: Currency) -> Result<Wallet, LedgerError> {
        if self.exists_by_name(name).await? {
            return Err(LedgerError::NameConflict(name.to_string()));
        }

        let wallet = Wallet::new(name.to_string(), currency);

        let inserted = sqlx::query(
            r#"
            INSERT INTO wallets (id, name, currency, balance, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(wallet.id.to_string())
        .bind(&wallet.name)
        .bind(wallet.currency.as_str())
        .bind(wallet.balance.to_string())
        .bind(wallet.created_at.to_rfc3339())
        .bind(wallet.updated_at.to_rfc3339())
        .execute(self.db.pool())
        .await;

        match inserted {
            Ok(_) => Ok(wallet),
            // Lost a race against a concurrent create with the same name
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => {
                Err(LedgerError::NameConflict(name.to_string()))
            }
            Err(e) => Err(anyhow::Error::new(e).context("Failed to save wallet").into()),
        }
    }

    /// Get a wallet by ID, failing with `NotFound` if it does not exist.
    pub async fn get(&self, id: WalletId) -> Result<Wallet, LedgerError> {
        self.find(id).await?.ok_or(LedgerError::NotFound(id))
    }

    /// Get a wallet by ID.
    pub async fn find(&self, id: WalletId) -> Result<Option<Wallet>> {
        let row = sqlx::query(&format!("SELECT {WALLET_COLUMNS} FROM wallets WHERE id = ?"))
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await
            .context("Failed to fetch wallet")?;

        row.as_ref().map(Self::row_to_wallet).transpose()
    }

    /// List all wallets ordered by name.
    pub async fn list(&self) -> Result<Vec<Wallet>> {
        let rows = sqlx::query(&format!("SELECT {WALLET_COLUMNS} FROM wallets ORDER BY name"))
            .fetch_all(self.db.pool())
            .await
            .context("Failed to list wallets")?;

        rows.iter().map(Self::row_to_wallet).collect()
    }

    /// Read-only existence probe used by request validation.
    pub async fn exists_by_id(&self, id: WalletId) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM wallets WHERE id = ?) AS found")
            .bind(id.to_string())
            .fetch_one(self.db.pool())
            .await
            .context("Failed to probe wallet id")?;
        Ok(row.get::<i64, _>("found") != 0)
    }

    pub async fn exists_by_name(&self, name: &str) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM wallets WHERE name = ?) AS found")
            .bind(name)
            .fetch_one(self.db.pool())
            .await
            .context("Failed to probe wallet name")?;
        Ok(row.get::<i64, _>("found") != 0)
    }

    /// Persist a wallet's balance inside the caller's SQL transaction, but
    /// only if the stored balance still equals `read_balance`.
    ///
    /// Returns `false` when another writer changed the balance first; the
    /// row is left untouched in that case.
    pub(crate) async fn save_balance(
        conn: &mut SqliteConnection,
        wallet: &Wallet,
        read_balance: Decimal,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE wallets SET balance = ?, updated_at = ? WHERE id = ? AND balance = ?",
        )
        .bind(wallet.balance.to_string())
        .bind(wallet.updated_at.to_rfc3339())
        .bind(wallet.id.to_string())
        .bind(read_balance.to_string())
        .execute(&mut *conn)
        .await
        .with_context(|| format!("Failed to save balance of wallet {}", wallet.id))?;

        Ok(result.rows_affected() == 1)
    }

    fn row_to_wallet(row: &sqlx::sqlite::SqliteRow) -> Result<Wallet> {
        let id_str: String = row.get("id");
        let currency_str: String = row.get("currency");
        let balance_str: String = row.get("balance");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        Ok(Wallet {
            id: Uuid::parse_str(&id_str).context("Invalid wallet ID")?,
            name: row.get("name"),
            currency: Currency::from_str(&currency_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid currency: {}", currency_str))?,
            balance: Decimal::from_str(&balance_str).context("Invalid wallet balance")?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
            updated_at: parse_timestamp(&updated_at_str).context("Invalid updated_at timestamp")?,
        })
    }
}

pub(crate) fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    use super::*;
    use crate::config::LedgerConfig;

    async fn test_store() -> (WalletStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = LedgerConfig::new(temp_dir.path().join("wallets.db"));
        let db = Database::init(&config).await.unwrap();
        (db.wallet_store(), temp_dir)
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (store, _temp) = test_store().await;

        let wallet = store.create("Checking", Currency::Eur).await.unwrap();
        assert_eq!(wallet.balance, Decimal::ZERO);

        let fetched = store.get(wallet.id).await.unwrap();
        assert_eq!(fetched.name, "Checking");
        assert_eq!(fetched.currency, Currency::Eur);
        assert!(store.exists_by_id(wallet.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let (store, _temp) = test_store().await;

        store.create("Checking", Currency::Eur).await.unwrap();
        let err = store.create("Checking", Currency::Czk).await.unwrap_err();
        assert!(matches!(err, LedgerError::NameConflict(name) if name == "Checking"));
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let (store, _temp) = test_store().await;
        let id = Uuid::new_v4();

        assert!(matches!(store.get(id).await, Err(LedgerError::NotFound(missing)) if missing == id));
        assert!(!store.exists_by_id(id).await.unwrap());
    }

    #[tokio::test]
    async fn test_save_balance_keeps_precision() {
        let (store, _temp) = test_store().await;
        let mut wallet = store.create("Savings", Currency::Czk).await.unwrap();

        wallet.credit(dec!(1234.5678));
        let mut tx = store.database().begin().await.unwrap();
        assert!(WalletStore::save_balance(&mut tx, &wallet, Decimal::ZERO).await.unwrap());
        tx.commit().await.unwrap();

        assert_eq!(store.get(wallet.id).await.unwrap().balance, dec!(1234.5678));
    }

    #[tokio::test]
    async fn test_save_balance_skips_changed_row() {
        let (store, _temp) = test_store().await;
        let mut first = store.create("Shared", Currency::Eur).await.unwrap();
        let mut second = first.clone();

        // Both writers read zero; the first one lands.
        first.credit(dec!(10));
        let mut tx = store.database().begin().await.unwrap();
        assert!(WalletStore::save_balance(&mut tx, &first, Decimal::ZERO).await.unwrap());
        tx.commit().await.unwrap();

        second.credit(dec!(5));
        let mut tx = store.database().begin().await.unwrap();
        assert!(!WalletStore::save_balance(&mut tx, &second, Decimal::ZERO).await.unwrap());
        tx.rollback().await.unwrap();

        assert_eq!(store.get(first.id).await.unwrap().balance, dec!(10));
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_name() {
        let (store, _temp) = test_store().await;
        store.create("Zulu", Currency::Eur).await.unwrap();
        store.create("Alpha", Currency::Eur).await.unwrap();

        let names: Vec<_> = store.list().await.unwrap().into_iter().map(|w| w.name).collect();
        assert_eq!(names, vec!["Alpha", "Zulu"]);
    }
}
