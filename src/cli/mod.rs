use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::application::LedgerEngine;
use crate::application::request::{
    CreateWalletRequest, DepositRequest, TransferRequest, WalletLookupRequest, WithdrawRequest,
};
use crate::config::{LedgerConfig, PendingPolicy};
use crate::domain::{Transaction, Wallet, format_amount};
use crate::error::{ErrorStatus, LedgerError};
use crate::io::{ExportFormat, Exporter};

/// Wallet Ledger - wallets, deposits, withdrawals and transfers
#[derive(Parser)]
#[command(name = "wallet-ledger")]
#[command(about = "A wallet ledger with an auditable transaction log")]
#[command(version)]
pub struct Cli {
    /// Database file path (overrides WALLET_LEDGER_DATABASE)
    #[arg(short, long, global = true)]
    pub database: Option<PathBuf>,

    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Maximum wait for a wallet lock, in milliseconds
    #[arg(long, global = true)]
    pub lock_timeout_ms: Option<u64>,

    /// What to do with a journaled record when funds are insufficient:
    /// mark-failed or leave-pending
    #[arg(long, global = true)]
    pub pending_policy: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Wallet management commands
    #[command(subcommand)]
    Wallet(WalletCommands),

    /// Deposit money into a wallet from a bank account
    Deposit {
        /// Wallet ID
        wallet_id: String,

        /// Amount to deposit (e.g., "50.00" or "50")
        amount: String,

        /// Currency of the amount (CZK or EUR)
        #[arg(long)]
        currency: String,

        /// Source bank account number (10-18 digits)
        #[arg(long)]
        account_number: String,

        /// Source bank code (4-6 digits)
        #[arg(long)]
        bank_code: String,
    },

    /// Withdraw money from a wallet to a bank account
    Withdraw {
        /// Wallet ID
        wallet_id: String,

        /// Amount to withdraw
        amount: String,

        /// Currency of the amount (CZK or EUR)
        #[arg(long)]
        currency: String,

        /// Destination bank account number (10-18 digits)
        #[arg(long)]
        account_number: String,

        /// Destination bank code (4-6 digits)
        #[arg(long)]
        bank_code: String,
    },

    /// Transfer money between two wallets
    Transfer {
        /// Amount to transfer
        amount: String,

        /// Sender wallet ID
        #[arg(long)]
        from: String,

        /// Receiver wallet ID
        #[arg(long)]
        to: String,

        /// Currency of the amount (CZK or EUR)
        #[arg(long)]
        currency: String,
    },

    /// Show the transaction history of a wallet
    History {
        /// Wallet ID
        wallet_id: String,
    },

    /// Verify that stored balances match the transaction log
    Check,

    /// Export data as CSV or JSON
    #[command(subcommand)]
    Export(ExportCommands),
}

#[derive(Subcommand)]
pub enum WalletCommands {
    /// Create a new wallet
    Create {
        /// Wallet name (3-50 characters, unique)
        name: String,

        /// Currency (CZK or EUR)
        #[arg(long)]
        currency: String,
    },

    /// Show wallet details
    Get {
        /// Wallet ID
        wallet_id: String,
    },

    /// List all wallets
    List,
}

#[derive(Subcommand)]
pub enum ExportCommands {
    /// Export a wallet's transaction history
    History {
        /// Wallet ID
        wallet_id: String,

        /// Output format: csv, json
        #[arg(long, default_value = "csv")]
        format: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Export all wallets and their balances
    Wallets {
        /// Output format: csv, json
        #[arg(long, default_value = "csv")]
        format: String,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Cli {
    /// Resolve configuration: defaults, then environment, then flags.
    pub fn config(&self) -> Result<LedgerConfig> {
        let mut config = LedgerConfig::from_env()?;

        if let Some(path) = &self.database {
            config.database_path = path.clone();
        }
        if let Some(ms) = self.lock_timeout_ms {
            config.lock_timeout = Duration::from_millis(ms);
        }
        if let Some(policy) = &self.pending_policy {
            config.pending_policy = PendingPolicy::from_str(policy).with_context(|| {
                format!(
                    "Invalid pending policy '{}'. Valid values: mark-failed, leave-pending",
                    policy
                )
            })?;
        }

        Ok(config)
    }

    pub async fn run(self) -> Result<()> {
        let config = self.config()?;

        match self.command {
            Commands::Init => {
                let path = config.database_path.clone();
                LedgerEngine::init(config).await?;
                println!("Database initialized: {}", path.display());
            }

            Commands::Wallet(wallet_cmd) => {
                let engine = LedgerEngine::connect(config).await?;
                run_wallet_command(&engine, wallet_cmd).await?;
            }

            Commands::Deposit {
                wallet_id,
                amount,
                currency,
                account_number,
                bank_code,
            } => {
                let engine = LedgerEngine::connect(config).await?;
                let request = DepositRequest {
                    wallet_id,
                    currency,
                    amount,
                    account_number,
                    bank_code,
                };
                let tx = request.execute(&engine).await?;
                print_movement("Deposited", &tx);
            }

            Commands::Withdraw {
                wallet_id,
                amount,
                currency,
                account_number,
                bank_code,
            } => {
                let engine = LedgerEngine::connect(config).await?;
                let request = WithdrawRequest {
                    wallet_id,
                    currency,
                    amount,
                    account_number,
                    bank_code,
                };
                let tx = request.execute(&engine).await?;
                print_movement("Withdrew", &tx);
            }

            Commands::Transfer {
                amount,
                from,
                to,
                currency,
            } => {
                let engine = LedgerEngine::connect(config).await?;
                let request = TransferRequest {
                    sender_wallet_id: from,
                    receiver_wallet_id: to,
                    currency,
                    amount,
                };
                let tx = request.execute(&engine).await?;
                print_movement("Transferred", &tx);
            }

            Commands::History { wallet_id } => {
                let engine = LedgerEngine::connect(config).await?;
                let history = WalletLookupRequest { wallet_id }.history(&engine).await?;
                print_history(&history);
            }

            Commands::Check => {
                let engine = LedgerEngine::connect(config).await?;
                run_check_command(&engine).await?;
            }

            Commands::Export(export_cmd) => {
                let engine = LedgerEngine::connect(config).await?;
                run_export_command(&engine, export_cmd).await?;
            }
        }

        Ok(())
    }
}

async fn run_wallet_command(engine: &LedgerEngine, cmd: WalletCommands) -> Result<()> {
    match cmd {
        WalletCommands::Create { name, currency } => {
            let wallet = CreateWalletRequest { name, currency }
                .execute(engine)
                .await?;
            println!(
                "Created wallet: {} ({}) {}",
                wallet.name, wallet.currency, wallet.id
            );
        }

        WalletCommands::Get { wallet_id } => {
            let wallet = WalletLookupRequest { wallet_id }.wallet(engine).await?;
            print_wallet(&wallet);
        }

        WalletCommands::List => {
            let wallets = engine.list_wallets().await?;
            if wallets.is_empty() {
                println!("No wallets found.");
            } else {
                println!("{:<36}  {:<20} {:<8} {:>15}", "ID", "NAME", "CURRENCY", "BALANCE");
                println!("{}", "-".repeat(82));
                for wallet in wallets {
                    println!(
                        "{:<36}  {:<20} {:<8} {:>15}",
                        wallet.id,
                        truncate(&wallet.name, 20),
                        wallet.currency,
                        format_amount(wallet.balance)
                    );
                }
            }
        }
    }
    Ok(())
}

async fn run_check_command(engine: &LedgerEngine) -> Result<()> {
    let report = engine.check_integrity().await?;

    println!("Wallets:      {}", report.wallet_count);
    println!("Transactions: {}", report.transaction_count);
    println!("  Pending:    {}", report.pending_count);
    println!("  Failed:     {}", report.failed_count);

    for id in &report.negative_balances {
        println!("NEGATIVE BALANCE: wallet {}", id);
    }
    for d in &report.discrepancies {
        println!(
            "MISMATCH: {} stored {} but transactions sum to {}",
            d.wallet_name,
            format_amount(d.stored),
            format_amount(d.computed)
        );
    }

    if report.is_healthy() {
        println!("Ledger is consistent.");
        Ok(())
    } else {
        anyhow::bail!("Ledger integrity check failed")
    }
}

async fn run_export_command(engine: &LedgerEngine, cmd: ExportCommands) -> Result<()> {
    use std::fs::File;
    use std::io::{Write, stdout};

    fn open_output(output: &Option<PathBuf>) -> Result<Box<dyn Write>> {
        Ok(match output {
            Some(path) => Box::new(
                File::create(path)
                    .with_context(|| format!("Failed to create {}", path.display()))?,
            ),
            None => Box::new(stdout()),
        })
    }

    fn parse_format(format: &str) -> Result<ExportFormat> {
        ExportFormat::from_str(format)
            .with_context(|| format!("Invalid format '{}'. Valid formats: csv, json", format))
    }

    match cmd {
        ExportCommands::History {
            wallet_id,
            format,
            output,
        } => {
            let format = parse_format(&format)?;
            let wallet_id = WalletLookupRequest { wallet_id }.validate(engine).await?;
            let count = Exporter::new(engine)
                .export_history(wallet_id, format, open_output(&output)?)
                .await?;
            if let Some(path) = output {
                eprintln!("Exported {} transaction(s) to {}", count, path.display());
            }
        }

        ExportCommands::Wallets { format, output } => {
            let format = parse_format(&format)?;
            let count = Exporter::new(engine)
                .export_wallets(format, open_output(&output)?)
                .await?;
            if let Some(path) = output {
                eprintln!("Exported {} wallet(s) to {}", count, path.display());
            }
        }
    }
    Ok(())
}

fn print_wallet(wallet: &Wallet) {
    println!("Wallet: {}", wallet.name);
    println!("  ID:       {}", wallet.id);
    println!("  Currency: {}", wallet.currency);
    println!("  Balance:  {} {}", format_amount(wallet.balance), wallet.currency);
    println!("  Created:  {}", wallet.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Updated:  {}", wallet.updated_at.format("%Y-%m-%d %H:%M:%S"));
}

fn print_movement(verb: &str, tx: &Transaction) {
    println!(
        "{} {} {} ({}, {})",
        verb,
        format_amount(tx.amount),
        tx.currency,
        tx.status,
        tx.id
    );
}

fn print_history(history: &[Transaction]) {
    if history.is_empty() {
        println!("No transactions found.");
        return;
    }

    println!(
        "{:>5}  {:<19}  {:<10}  {:<9}  {:>15}  {:<8}  ID",
        "SEQ", "DATE", "TYPE", "STATUS", "AMOUNT", "CURRENCY"
    );
    println!("{}", "-".repeat(110));
    for tx in history {
        println!(
            "{:>5}  {:<19}  {:<10}  {:<9}  {:>15}  {:<8}  {}",
            tx.sequence,
            tx.created_at.format("%Y-%m-%d %H:%M:%S"),
            tx.transaction_type,
            tx.status,
            format_amount(tx.amount),
            tx.currency,
            tx.id
        );
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

/// Print an error the way the CLI reports it and pick the process exit code.
pub fn report_error(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<LedgerError>() {
        Some(LedgerError::Validation(errors)) => {
            eprintln!("error[invalid_request]: request has invalid fields");
            for field_error in errors {
                eprintln!("  {}", field_error);
            }
            exit_code(ErrorStatus::BadRequest)
        }
        Some(ledger_err) => {
            eprintln!("error[{}]: {}", ledger_err.code(), ledger_err);
            if let Some(cause) = std::error::Error::source(ledger_err) {
                eprintln!("  caused by: {}", cause);
            }
            exit_code(ledger_err.status())
        }
        None => {
            eprintln!("error: {:#}", err);
            1
        }
    }
}

fn exit_code(status: ErrorStatus) -> u8 {
    match status {
        ErrorStatus::BadRequest => 2,
        ErrorStatus::NotFound => 3,
        ErrorStatus::Conflict => 4,
        ErrorStatus::Unavailable => 5,
        ErrorStatus::Internal => 1,
    }
}
