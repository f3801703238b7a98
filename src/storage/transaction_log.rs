use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Row, SqliteConnection};
use uuid::Uuid;

use crate::domain::{
    BankRef, Currency, Transaction, TransactionId, TransactionStatus, TransactionType, WalletId,
};

use super::Database;
use super::wallet_store::parse_timestamp;

const TRANSACTION_COLUMNS: &str = "id, sequence, sender_wallet_id, receiver_wallet_id, currency, amount, account_number, bank_code, transaction_type, status, created_at, updated_at";

/// Append-only journal of money movements. Only the status of a record
/// changes after it has been appended.
#[derive(Debug, Clone)]
pub struct TransactionLog {
    db: Database,
}

impl TransactionLog {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Persist a new record as Pending.
    /// Assigns the id, the next sequence number and the timestamps.
    pub async fn append(&self, mut transaction: Transaction) -> Result<Transaction> {
        let now = Utc::now();
        transaction.id = Uuid::new_v4();
        transaction.status = TransactionStatus::Pending;
        transaction.created_at = now;
        transaction.updated_at = now;

        let mut tx = self.db.begin().await?;
        transaction.sequence = Self::next_sequence(&mut tx).await?;

        let account_number = transaction.bank_ref.as_ref().map(|b| b.account_number.clone());
        let bank_code = transaction.bank_ref.as_ref().map(|b| b.bank_code.clone());

        sqlx::query(
            r#"
            INSERT INTO transactions (id, sequence, sender_wallet_id, receiver_wallet_id, currency, amount, account_number, bank_code, transaction_type, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id.to_string())
        .bind(transaction.sequence)
        .bind(transaction.sender_wallet.map(|id| id.to_string()))
        .bind(transaction.receiver_wallet.map(|id| id.to_string()))
        .bind(transaction.currency.as_str())
        .bind(transaction.amount.to_string())
        .bind(account_number)
        .bind(bank_code)
        .bind(transaction.transaction_type.as_str())
        .bind(transaction.status.as_str())
        .bind(transaction.created_at.to_rfc3339())
        .bind(transaction.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("Failed to append transaction")?;

        tx.commit().await.context("Failed to commit appended transaction")?;
        Ok(transaction)
    }

    /// Get the next sequence number and increment the counter.
    async fn next_sequence(conn: &mut SqliteConnection) -> Result<i64> {
        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transaction_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *conn)
        .await
        .context("Failed to get next sequence number")?;

        Ok(row.get("value"))
    }

    /// Move a record to `status`. Re-applying the current status is a no-op;
    /// leaving a terminal status is rejected.
    pub async fn update_status(&self, id: TransactionId, status: TransactionStatus) -> Result<()> {
        let mut conn = self
            .db
            .pool()
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        Self::apply_status(&mut conn, id, status, Utc::now()).await
    }

    /// Same as `update_status`, inside the caller's SQL transaction.
    ///
    /// The transition is checked by the UPDATE itself: only a Pending row is
    /// moved, so two writers racing to different terminal states cannot both
    /// win.
    pub(crate) async fn apply_status(
        conn: &mut SqliteConnection,
        id: TransactionId,
        status: TransactionStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        if status.is_terminal() {
            let result = sqlx::query(
                "UPDATE transactions SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
            )
            .bind(status.as_str())
            .bind(updated_at.to_rfc3339())
            .bind(id.to_string())
            .bind(TransactionStatus::Pending.as_str())
            .execute(&mut *conn)
            .await
            .context("Failed to update transaction status")?;

            if result.rows_affected() == 1 {
                return Ok(());
            }
        }

        // Nothing moved: either the status is already the requested one, or
        // the transition is not allowed.
        let row = sqlx::query("SELECT status FROM transactions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .context("Failed to fetch transaction status")?;

        let Some(row) = row else {
            bail!("Transaction {} not found", id);
        };
        let current_str: String = row.get("status");
        let current = TransactionStatus::from_str(&current_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid transaction status: {}", current_str))?;

        if current == status {
            return Ok(());
        }
        bail!("Transaction {} cannot move from {} to {}", id, current, status);
    }

    /// Get a transaction by ID.
    pub async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(self.db.pool())
        .await
        .context("Failed to fetch transaction")?;

        row.as_ref().map(Self::row_to_transaction).transpose()
    }

    /// Every transaction where the wallet is sender or receiver, by sequence.
    pub async fn history_for(&self, wallet_id: WalletId) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE sender_wallet_id = ? OR receiver_wallet_id = ?
            ORDER BY sequence
            "#
        ))
        .bind(wallet_id.to_string())
        .bind(wallet_id.to_string())
        .fetch_all(self.db.pool())
        .await
        .context("Failed to list transactions for wallet")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// List all transactions, ordered by sequence number.
    pub async fn list(&self) -> Result<Vec<Transaction>> {
        let rows = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions ORDER BY sequence"
        ))
        .fetch_all(self.db.pool())
        .await
        .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    fn row_to_transaction(row: &sqlx::sqlite::SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let sender_str: Option<String> = row.get("sender_wallet_id");
        let receiver_str: Option<String> = row.get("receiver_wallet_id");
        let currency_str: String = row.get("currency");
        let amount_str: String = row.get("amount");
        let account_number: Option<String> = row.get("account_number");
        let bank_code: Option<String> = row.get("bank_code");
        let type_str: String = row.get("transaction_type");
        let status_str: String = row.get("status");
        let created_at_str: String = row.get("created_at");
        let updated_at_str: String = row.get("updated_at");

        let bank_ref = match (account_number, bank_code) {
            (Some(account_number), Some(bank_code)) => Some(BankRef {
                account_number,
                bank_code,
            }),
            _ => None,
        };

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            sequence: row.get("sequence"),
            sender_wallet: sender_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid sender wallet ID")?,
            receiver_wallet: receiver_str
                .map(|s| Uuid::parse_str(&s))
                .transpose()
                .context("Invalid receiver wallet ID")?,
            currency: Currency::from_str(&currency_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid currency: {}", currency_str))?,
            amount: Decimal::from_str(&amount_str).context("Invalid transaction amount")?,
            bank_ref,
            transaction_type: TransactionType::from_str(&type_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction type: {}", type_str))?,
            status: TransactionStatus::from_str(&status_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction status: {}", status_str))?,
            created_at: parse_timestamp(&created_at_str).context("Invalid created_at timestamp")?,
            updated_at: parse_timestamp(&updated_at_str).context("Invalid updated_at timestamp")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use tempfile::TempDir;

    use super::*;
    use crate::config::LedgerConfig;
    use crate::storage::WalletStore;

    async fn test_log() -> (WalletStore, TransactionLog, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = LedgerConfig::new(temp_dir.path().join("log.db"));
        let db = Database::init(&config).await.unwrap();
        (db.wallet_store(), db.transaction_log(), temp_dir)
    }

    fn bank() -> BankRef {
        BankRef::new("1234567890", "0800")
    }

    #[tokio::test]
    async fn test_append_assigns_sequence_and_pending() {
        let (wallets, log, _temp) = test_log().await;
        let wallet = wallets.create("Checking", Currency::Eur).await.unwrap();

        let first = log
            .append(Transaction::deposit(wallet.id, Currency::Eur, dec!(10), bank()))
            .await
            .unwrap();
        let second = log
            .append(Transaction::deposit(wallet.id, Currency::Eur, dec!(20), bank()))
            .await
            .unwrap();

        assert_eq!(first.status, TransactionStatus::Pending);
        assert!(second.sequence > first.sequence);
        assert_ne!(first.id, second.id);

        let stored = log.get(first.id).await.unwrap().unwrap();
        assert_eq!(stored, first);
    }

    #[tokio::test]
    async fn test_update_status_is_idempotent() {
        let (wallets, log, _temp) = test_log().await;
        let wallet = wallets.create("Checking", Currency::Eur).await.unwrap();
        let tx = log
            .append(Transaction::deposit(wallet.id, Currency::Eur, dec!(10), bank()))
            .await
            .unwrap();

        log.update_status(tx.id, TransactionStatus::Completed).await.unwrap();
        log.update_status(tx.id, TransactionStatus::Completed).await.unwrap();

        let stored = log.get(tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Completed);
    }

    #[tokio::test]
    async fn test_terminal_status_is_never_reversed() {
        let (wallets, log, _temp) = test_log().await;
        let wallet = wallets.create("Checking", Currency::Eur).await.unwrap();
        let tx = log
            .append(Transaction::withdrawal(wallet.id, Currency::Eur, dec!(10), bank()))
            .await
            .unwrap();

        log.update_status(tx.id, TransactionStatus::Failed).await.unwrap();
        assert!(log.update_status(tx.id, TransactionStatus::Completed).await.is_err());
        assert!(log.update_status(tx.id, TransactionStatus::Pending).await.is_err());

        let stored = log.get(tx.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransactionStatus::Failed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_terminal_updates_have_one_winner() {
        let (wallets, log, _temp) = test_log().await;
        let wallet = wallets.create("Checking", Currency::Eur).await.unwrap();

        for _ in 0..10 {
            let id = log
                .append(Transaction::deposit(wallet.id, Currency::Eur, dec!(1), bank()))
                .await
                .unwrap()
                .id;

            let complete = {
                let log = log.clone();
                tokio::spawn(async move { log.update_status(id, TransactionStatus::Completed).await })
            };
            let fail = {
                let log = log.clone();
                tokio::spawn(async move { log.update_status(id, TransactionStatus::Failed).await })
            };
            let completed = complete.await.unwrap().is_ok();
            let failed = fail.await.unwrap().is_ok();
            assert!(completed != failed, "exactly one terminal update must win");

            let stored = log.get(id).await.unwrap().unwrap();
            let expected = if completed {
                TransactionStatus::Completed
            } else {
                TransactionStatus::Failed
            };
            assert_eq!(stored.status, expected);
        }
    }

    #[tokio::test]
    async fn test_update_unknown_transaction_fails() {
        let (_wallets, log, _temp) = test_log().await;
        assert!(log.update_status(Uuid::new_v4(), TransactionStatus::Completed).await.is_err());
    }

    #[tokio::test]
    async fn test_history_for_matches_sender_or_receiver() {
        let (wallets, log, _temp) = test_log().await;
        let a = wallets.create("Alpha", Currency::Eur).await.unwrap();
        let b = wallets.create("Bravo", Currency::Eur).await.unwrap();
        let c = wallets.create("Charlie", Currency::Eur).await.unwrap();

        let deposit = log
            .append(Transaction::deposit(a.id, Currency::Eur, dec!(10), bank()))
            .await
            .unwrap();
        let transfer = log
            .append(Transaction::transfer(a.id, b.id, Currency::Eur, dec!(5)))
            .await
            .unwrap();
        log.append(Transaction::deposit(c.id, Currency::Eur, dec!(1), bank()))
            .await
            .unwrap();

        let history_a: Vec<_> = log.history_for(a.id).await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(history_a, vec![deposit.id, transfer.id]);

        let history_b: Vec<_> = log.history_for(b.id).await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(history_b, vec![transfer.id]);

        assert_eq!(log.list().await.unwrap().len(), 3);
    }
}
