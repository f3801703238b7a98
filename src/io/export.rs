use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::Write;

use crate::application::LedgerEngine;
use crate::domain::{Transaction, Wallet, WalletId, format_amount};

/// Output format for exports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Json,
}

impl ExportFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }
}

/// A wallet together with its full transaction history.
#[derive(Debug, Clone, Serialize)]
pub struct WalletStatement {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub wallet: Wallet,
    pub transactions: Vec<Transaction>,
}

/// Exporter for converting ledger data to CSV or JSON
pub struct Exporter<'a> {
    engine: &'a LedgerEngine,
}

impl<'a> Exporter<'a> {
    pub fn new(engine: &'a LedgerEngine) -> Self {
        Self { engine }
    }

    /// Export a wallet's history. Returns the number of transactions written.
    pub async fn export_history<W: Write>(
        &self,
        wallet_id: WalletId,
        format: ExportFormat,
        writer: W,
    ) -> Result<usize> {
        let wallet = self.engine.get_wallet(wallet_id).await?;
        let transactions = self.engine.history(wallet_id).await?;
        let count = transactions.len();

        match format {
            ExportFormat::Csv => write_history_csv(&transactions, writer)?,
            ExportFormat::Json => {
                let statement = WalletStatement {
                    version: env!("CARGO_PKG_VERSION").to_string(),
                    exported_at: Utc::now(),
                    wallet,
                    transactions,
                };
                write_json(&statement, writer)?;
            }
        }
        Ok(count)
    }

    /// Export all wallets with their balances. Returns the number of wallets written.
    pub async fn export_wallets<W: Write>(&self, format: ExportFormat, writer: W) -> Result<usize> {
        let wallets = self.engine.list_wallets().await?;

        match format {
            ExportFormat::Csv => {
                let mut csv_writer = csv::Writer::from_writer(writer);
                csv_writer.write_record(["id", "name", "currency", "balance", "created_at", "updated_at"])?;
                for wallet in &wallets {
                    csv_writer.write_record([
                        wallet.id.to_string(),
                        wallet.name.clone(),
                        wallet.currency.to_string(),
                        format_amount(wallet.balance),
                        wallet.created_at.to_rfc3339(),
                        wallet.updated_at.to_rfc3339(),
                    ])?;
                }
                csv_writer.flush()?;
            }
            ExportFormat::Json => write_json(&wallets, writer)?,
        }
        Ok(wallets.len())
    }
}

fn write_history_csv<W: Write>(transactions: &[Transaction], writer: W) -> Result<()> {
    let mut csv_writer = csv::Writer::from_writer(writer);

    csv_writer.write_record([
        "id",
        "sequence",
        "type",
        "status",
        "sender_wallet",
        "receiver_wallet",
        "currency",
        "amount",
        "account_number",
        "bank_code",
        "created_at",
        "updated_at",
    ])?;

    for tx in transactions {
        let bank_ref = tx.bank_ref.as_ref();
        csv_writer.write_record([
            tx.id.to_string(),
            tx.sequence.to_string(),
            tx.transaction_type.to_string(),
            tx.status.to_string(),
            tx.sender_wallet.map(|id| id.to_string()).unwrap_or_default(),
            tx.receiver_wallet.map(|id| id.to_string()).unwrap_or_default(),
            tx.currency.to_string(),
            format_amount(tx.amount),
            bank_ref.map(|b| b.account_number.clone()).unwrap_or_default(),
            bank_ref.map(|b| b.bank_code.clone()).unwrap_or_default(),
            tx.created_at.to_rfc3339(),
            tx.updated_at.to_rfc3339(),
        ])?;
    }

    csv_writer.flush()?;
    Ok(())
}

fn write_json<T: Serialize, W: Write>(value: &T, mut writer: W) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    writer.write_all(json.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_format_parse() {
        assert_eq!(ExportFormat::from_str("CSV"), Some(ExportFormat::Csv));
        assert_eq!(ExportFormat::from_str("json"), Some(ExportFormat::Json));
        assert_eq!(ExportFormat::from_str("xml"), None);
    }

    #[test]
    fn test_history_csv_has_header_and_rows() {
        use crate::domain::{BankRef, Currency};
        use rust_decimal_macros::dec;
        use uuid::Uuid;

        let tx = Transaction::deposit(Uuid::new_v4(), Currency::Eur, dec!(12.5), BankRef::new("1234567890", "0800"));
        let mut out = Vec::new();
        write_history_csv(std::slice::from_ref(&tx), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("id,sequence,type,status"));
        assert!(lines[1].contains("DEPOSIT,PENDING"));
        assert!(lines[1].contains("12.50"));
        assert!(lines[1].contains("1234567890,0800"));
    }
}
