use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, Currency, WalletId};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Deposit => "DEPOSIT",
            TransactionType::Withdrawal => "WITHDRAWAL",
            TransactionType::Transfer => "TRANSFER",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "DEPOSIT" => Some(TransactionType::Deposit),
            "WITHDRAWAL" => Some(TransactionType::Withdrawal),
            "TRANSFER" => Some(TransactionType::Transfer),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "PENDING",
            TransactionStatus::Completed => "COMPLETED",
            TransactionStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PENDING" => Some(TransactionStatus::Pending),
            "COMPLETED" => Some(TransactionStatus::Completed),
            "FAILED" => Some(TransactionStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Pending may move to either terminal state; re-applying the current
    /// status is accepted so that status updates stay idempotent.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        *self == next || (*self == TransactionStatus::Pending && next.is_terminal())
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bank routing details attached to deposits and withdrawals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankRef {
    pub account_number: String,
    pub bank_code: String,
}

impl BankRef {
    pub fn new(account_number: impl Into<String>, bank_code: impl Into<String>) -> Self {
        Self {
            account_number: account_number.into(),
            bank_code: bank_code.into(),
        }
    }
}

/// A single money movement. Everything except `status` (and `updated_at`)
/// is fixed once the record has been appended to the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    /// Monotonically increasing sequence number for ordering
    pub sequence: i64,
    /// Wallet whose balance decreases (withdrawal, transfer)
    pub sender_wallet: Option<WalletId>,
    /// Wallet whose balance increases (deposit, transfer)
    pub receiver_wallet: Option<WalletId>,
    pub currency: Currency,
    /// Always positive
    pub amount: Amount,
    pub bank_ref: Option<BankRef>,
    pub transaction_type: TransactionType,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    fn new(
        transaction_type: TransactionType,
        sender_wallet: Option<WalletId>,
        receiver_wallet: Option<WalletId>,
        currency: Currency,
        amount: Amount,
        bank_ref: Option<BankRef>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            sequence: 0, // Will be set by the transaction log
            sender_wallet,
            receiver_wallet,
            currency,
            amount,
            bank_ref,
            transaction_type,
            status: TransactionStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn deposit(receiver: WalletId, currency: Currency, amount: Amount, bank_ref: BankRef) -> Self {
        Self::new(
            TransactionType::Deposit,
            None,
            Some(receiver),
            currency,
            amount,
            Some(bank_ref),
        )
    }

    pub fn withdrawal(sender: WalletId, currency: Currency, amount: Amount, bank_ref: BankRef) -> Self {
        Self::new(
            TransactionType::Withdrawal,
            Some(sender),
            None,
            currency,
            amount,
            Some(bank_ref),
        )
    }

    pub fn transfer(sender: WalletId, receiver: WalletId, currency: Currency, amount: Amount) -> Self {
        Self::new(
            TransactionType::Transfer,
            Some(sender),
            Some(receiver),
            currency,
            amount,
            None,
        )
    }

    /// Returns true if the wallet is the sender or the receiver.
    pub fn involves(&self, wallet_id: WalletId) -> bool {
        self.sender_wallet == Some(wallet_id) || self.receiver_wallet == Some(wallet_id)
    }

    /// Signed effect of this transaction on the given wallet's balance,
    /// counting only completed movements.
    pub fn effect_on(&self, wallet_id: WalletId) -> Amount {
        if self.status != TransactionStatus::Completed {
            return Amount::ZERO;
        }
        let mut effect = Amount::ZERO;
        if self.receiver_wallet == Some(wallet_id) {
            effect += self.amount;
        }
        if self.sender_wallet == Some(wallet_id) {
            effect -= self.amount;
        }
        effect
    }
}
