use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{Instrument, debug, error, info, instrument, warn};

use crate::config::{LedgerConfig, PendingPolicy};
use crate::domain::{
    Amount, BankRef, Currency, IntegrityReport, Transaction, TransactionId, TransactionStatus,
    Wallet, WalletId, build_integrity_report,
};
use crate::error::{LedgerError, Operation};
use crate::storage::{Database, TransactionLog, WalletStore};

use super::{WalletGuard, WalletLocks};

/// The ledger engine: the only component that moves money.
///
/// Each deposit, withdrawal and transfer runs as:
/// 1. precondition checks (existence, currency, identity),
/// 2. per-wallet locks, taken lowest id first,
/// 3. a Pending record appended to the transaction log,
/// 4. a fresh read of the balances and the funds check (withdraw/transfer),
/// 5. the commit group: balance writes and the Completed status in one SQL
///    transaction. If it fails the record is marked Failed instead.
///
/// The locks only serialize callers inside this process. Other processes on
/// the same database file are caught by the commit group itself: a balance
/// write only lands if the stored balance is still the one read in step 4,
/// otherwise steps 4 and 5 are retried.
pub struct LedgerEngine {
    wallets: WalletStore,
    log: TransactionLog,
    locks: WalletLocks,
    config: LedgerConfig,
}

impl LedgerEngine {
    /// Build an engine over stores that share one `Database`.
    pub fn new(wallets: WalletStore, log: TransactionLog, config: LedgerConfig) -> Self {
        Self {
            wallets,
            log,
            locks: WalletLocks::new(config.lock_timeout),
            config,
        }
    }

    fn from_database(db: Database, config: LedgerConfig) -> Self {
        Self::new(db.wallet_store(), db.transaction_log(), config)
    }

    /// Create (if needed) and migrate the database, then build an engine over it.
    pub async fn init(config: LedgerConfig) -> Result<Self, LedgerError> {
        let db = Database::init(&config).await?;
        Ok(Self::from_database(db, config))
    }

    /// Connect to an existing database.
    pub async fn connect(config: LedgerConfig) -> Result<Self, LedgerError> {
        let db = Database::connect(&config, false).await?;
        Ok(Self::from_database(db, config))
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn locks(&self) -> &WalletLocks {
        &self.locks
    }

    pub fn database(&self) -> &Database {
        self.wallets.database()
    }

    // ========================
    // Wallet operations
    // ========================

    #[instrument(skip(self))]
    pub async fn create_wallet(&self, name: &str, currency: Currency) -> Result<Wallet, LedgerError> {
        let wallet = self.wallets.create(name, currency).await?;
        info!(wallet_id = %wallet.id, "Created wallet");
        Ok(wallet)
    }

    pub async fn get_wallet(&self, id: WalletId) -> Result<Wallet, LedgerError> {
        self.wallets.get(id).await
    }

    pub async fn list_wallets(&self) -> Result<Vec<Wallet>, LedgerError> {
        Ok(self.wallets.list().await?)
    }

    /// Existence probe for request validation.
    pub async fn wallet_exists(&self, id: WalletId) -> Result<bool, LedgerError> {
        Ok(self.wallets.exists_by_id(id).await?)
    }

    /// Every transaction the wallet took part in, as sender or receiver.
    pub async fn history(&self, wallet_id: WalletId) -> Result<Vec<Transaction>, LedgerError> {
        if !self.wallets.exists_by_id(wallet_id).await? {
            return Err(LedgerError::NotFound(wallet_id));
        }
        Ok(self.log.history_for(wallet_id).await?)
    }

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, LedgerError> {
        Ok(self.log.get(id).await?)
    }

    /// Compare every stored balance with the balance implied by the log.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, LedgerError> {
        let wallets = self.wallets.list().await?;
        let transactions = self.log.list().await?;
        Ok(build_integrity_report(&wallets, &transactions))
    }

    // ========================
    // Money movements
    // ========================

    #[instrument(skip(self, bank_ref))]
    pub async fn deposit(
        &self,
        wallet_id: WalletId,
        currency: Currency,
        amount: Amount,
        bank_ref: BankRef,
    ) -> Result<Transaction, LedgerError> {
        debug_assert!(amount > Amount::ZERO, "Deposit amount must be positive");

        let wallet = self.wallets.get(wallet_id).await?;
        ensure_currency(Operation::Deposit, currency, wallet.currency)?;

        let guard = self.locks.acquire(wallet_id).await?;
        self.settle(
            Movement::Deposit(wallet_id),
            Transaction::deposit(wallet_id, currency, amount, bank_ref),
            vec![guard],
        )
        .await
    }

    #[instrument(skip(self, bank_ref))]
    pub async fn withdraw(
        &self,
        wallet_id: WalletId,
        currency: Currency,
        amount: Amount,
        bank_ref: BankRef,
    ) -> Result<Transaction, LedgerError> {
        debug_assert!(amount > Amount::ZERO, "Withdrawal amount must be positive");

        let wallet = self.wallets.get(wallet_id).await?;
        ensure_currency(Operation::Withdraw, currency, wallet.currency)?;

        let guard = self.locks.acquire(wallet_id).await?;
        self.settle(
            Movement::Withdraw(wallet_id),
            Transaction::withdrawal(wallet_id, currency, amount, bank_ref),
            vec![guard],
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn transfer(
        &self,
        sender_id: WalletId,
        receiver_id: WalletId,
        currency: Currency,
        amount: Amount,
    ) -> Result<Transaction, LedgerError> {
        debug_assert!(amount > Amount::ZERO, "Transfer amount must be positive");

        if sender_id == receiver_id {
            return Err(LedgerError::SameWalletTransfer(sender_id));
        }

        // Receiver first: when both sides mismatch, the receiver's error wins.
        let receiver = self.wallets.get(receiver_id).await?;
        let sender = self.wallets.get(sender_id).await?;
        ensure_currency(Operation::Transfer, currency, receiver.currency)?;
        ensure_currency(Operation::Transfer, currency, sender.currency)?;

        let (sender_guard, receiver_guard) = self.locks.acquire_pair(sender_id, receiver_id).await?;
        self.settle(
            Movement::Transfer {
                sender: sender_id,
                receiver: receiver_id,
            },
            Transaction::transfer(sender_id, receiver_id, currency, amount),
            vec![sender_guard, receiver_guard],
        )
        .await
    }

    /// Journal the movement and drive it to a final state on its own task.
    ///
    /// The task owns the wallet guards, so once the locks are held the
    /// record always ends Completed or Failed (or Pending under
    /// `PendingPolicy::LeavePending`), even if the caller stops polling.
    async fn settle(
        &self,
        movement: Movement,
        draft: Transaction,
        guards: Vec<WalletGuard>,
    ) -> Result<Transaction, LedgerError> {
        let settlement = Settlement {
            db: self.database().clone(),
            wallets: self.wallets.clone(),
            log: self.log.clone(),
            pending_policy: self.config.pending_policy,
        };

        let task = tokio::spawn(
            async move {
                let _guards = guards;
                settlement.run(movement, draft).await
            }
            .in_current_span(),
        );

        match task.await {
            Ok(result) => result,
            Err(e) => Err(movement.failure(
                anyhow::Error::new(e).context("Settlement task did not run to completion"),
            )),
        }
    }
}

/// Attempts at the conditional balance write before giving up on a wallet
/// that keeps changing underneath us.
const MAX_COMMIT_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, Copy)]
enum Movement {
    Deposit(WalletId),
    Withdraw(WalletId),
    Transfer { sender: WalletId, receiver: WalletId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Credit,
    Debit,
}

impl Movement {
    fn operation(&self) -> Operation {
        match self {
            Movement::Deposit(_) => Operation::Deposit,
            Movement::Withdraw(_) => Operation::Withdraw,
            Movement::Transfer { .. } => Operation::Transfer,
        }
    }

    /// Wallets touched, in the order they are read and written.
    fn postings(&self) -> Vec<(WalletId, Side)> {
        match *self {
            Movement::Deposit(wallet_id) => vec![(wallet_id, Side::Credit)],
            Movement::Withdraw(wallet_id) => vec![(wallet_id, Side::Debit)],
            Movement::Transfer { sender, receiver } => {
                vec![(receiver, Side::Credit), (sender, Side::Debit)]
            }
        }
    }

    fn failure(&self, source: anyhow::Error) -> LedgerError {
        match *self {
            Movement::Deposit(wallet_id) => LedgerError::DepositFailed { wallet_id, source },
            Movement::Withdraw(wallet_id) => LedgerError::WithdrawFailed { wallet_id, source },
            Movement::Transfer { sender, receiver } => LedgerError::TransferFailed {
                sender_id: sender,
                receiver_id: receiver,
                source,
            },
        }
    }
}

enum Attempt {
    Committed(Transaction),
    Insufficient { available: Amount },
    /// Another writer changed a balance between our read and our write.
    Stale,
}

struct Settlement {
    db: Database,
    wallets: WalletStore,
    log: TransactionLog,
    pending_policy: PendingPolicy,
}

impl Settlement {
    async fn run(self, movement: Movement, draft: Transaction) -> Result<Transaction, LedgerError> {
        let operation = movement.operation();
        let transaction = self.log.append(draft).await?;
        debug!(transaction_id = %transaction.id, sequence = transaction.sequence, %operation, "Journaled");

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            match self.try_commit(movement, &transaction).await {
                Ok(Attempt::Committed(transaction)) => {
                    info!(transaction_id = %transaction.id, %operation, "Completed");
                    return Ok(transaction);
                }
                Ok(Attempt::Insufficient { available }) => {
                    return Err(self.reject_insufficient(&transaction, operation, available).await);
                }
                Ok(Attempt::Stale) => {
                    debug!(transaction_id = %transaction.id, attempt, "Balance changed by another writer, retrying");
                    tokio::task::yield_now().await;
                }
                Err(source) => return Err(self.fail(movement, &transaction, source).await),
            }
        }

        let source = anyhow::anyhow!(
            "Wallet balance kept changing after {} attempts",
            MAX_COMMIT_ATTEMPTS
        );
        Err(self.fail(movement, &transaction, source).await)
    }

    /// Read fresh balances, check funds and write the commit group once.
    async fn try_commit(
        &self,
        movement: Movement,
        transaction: &Transaction,
    ) -> anyhow::Result<Attempt> {
        let mut touched = Vec::new();
        for (wallet_id, side) in movement.postings() {
            let mut wallet = self
                .wallets
                .find(wallet_id)
                .await?
                .with_context(|| format!("Wallet {} disappeared during settlement", wallet_id))?;
            let read_balance = wallet.balance;

            match side {
                Side::Credit => wallet.credit(transaction.amount),
                Side::Debit => {
                    if !wallet.can_cover(transaction.amount) {
                        return Ok(Attempt::Insufficient {
                            available: wallet.balance,
                        });
                    }
                    wallet.debit(transaction.amount);
                }
            }
            touched.push((wallet, read_balance));
        }

        let completed_at = Utc::now();
        if !apply_commit_group(&self.db, transaction, &touched, completed_at).await? {
            return Ok(Attempt::Stale);
        }

        let mut transaction = transaction.clone();
        transaction.status = TransactionStatus::Completed;
        transaction.updated_at = completed_at;
        Ok(Attempt::Committed(transaction))
    }

    /// Resolve a journaled record whose funds check failed, according to the
    /// configured policy, and build the error to return.
    async fn reject_insufficient(
        &self,
        transaction: &Transaction,
        operation: Operation,
        available: Amount,
    ) -> LedgerError {
        warn!(
            transaction_id = %transaction.id,
            requested = %transaction.amount,
            %available,
            "Insufficient funds"
        );

        if self.pending_policy == PendingPolicy::MarkFailed {
            self.mark_failed(transaction).await;
        }

        LedgerError::InsufficientFunds {
            operation,
            requested: transaction.amount,
            available,
        }
    }

    async fn fail(
        &self,
        movement: Movement,
        transaction: &Transaction,
        source: anyhow::Error,
    ) -> LedgerError {
        error!(transaction_id = %transaction.id, error = %source, operation = %movement.operation(), "Failed");
        self.mark_failed(transaction).await;
        movement.failure(source)
    }

    async fn mark_failed(&self, transaction: &Transaction) {
        if let Err(e) = self
            .log
            .update_status(transaction.id, TransactionStatus::Failed)
            .await
        {
            error!(transaction_id = %transaction.id, error = %e, "Could not mark transaction as failed");
        }
    }
}

/// Write the new balances and the Completed status in one SQL transaction.
///
/// Each balance write only applies if the stored balance still equals the
/// one read before the write. Returns `false`, with nothing applied, when
/// another writer got there first.
async fn apply_commit_group(
    db: &Database,
    transaction: &Transaction,
    wallets: &[(Wallet, Amount)],
    completed_at: DateTime<Utc>,
) -> anyhow::Result<bool> {
    let mut tx = db.begin().await?;

    for (wallet, read_balance) in wallets {
        if !WalletStore::save_balance(&mut tx, wallet, *read_balance).await? {
            tx.rollback().await.context("Failed to roll back stale ledger update")?;
            return Ok(false);
        }
    }
    TransactionLog::apply_status(
        &mut tx,
        transaction.id,
        TransactionStatus::Completed,
        completed_at,
    )
    .await?;

    tx.commit().await.context("Failed to commit ledger update")?;
    Ok(true)
}

fn ensure_currency(
    operation: Operation,
    requested: Currency,
    wallet: Currency,
) -> Result<(), LedgerError> {
    if requested != wallet {
        return Err(LedgerError::CurrencyMismatch {
            operation,
            requested,
            wallet,
        });
    }
    Ok(())
}
