use std::fmt;

use thiserror::Error;

use crate::domain::{Amount, Currency, WalletId};

/// Ledger operations that journal a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Deposit,
    Withdraw,
    Transfer,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Deposit => "deposit",
            Operation::Withdraw => "withdraw",
            Operation::Transfer => "transfer",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request field that failed format validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Coarse outcome class a caller can map onto its own transport
/// (HTTP status, process exit code, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorStatus {
    BadRequest,
    NotFound,
    Conflict,
    Unavailable,
    Internal,
}

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Wallet with id: {0} not found.")]
    NotFound(WalletId),

    #[error("Can't create wallet with name: {0} because it already exists.")]
    NameConflict(String),

    #[error("Can't {operation} {requested} with wallet with {wallet} currency.")]
    CurrencyMismatch {
        operation: Operation,
        requested: Currency,
        wallet: Currency,
    },

    #[error("Can't {operation} {requested} from wallet with only {available}.")]
    InsufficientFunds {
        operation: Operation,
        requested: Amount,
        available: Amount,
    },

    #[error("Sender wallet can't be the same as receiver wallet. Id: {0}.")]
    SameWalletTransfer(WalletId),

    #[error("Deposit to wallet with id: {wallet_id} failed.")]
    DepositFailed {
        wallet_id: WalletId,
        #[source]
        source: anyhow::Error,
    },

    #[error("Withdraw from wallet with id: {wallet_id} failed.")]
    WithdrawFailed {
        wallet_id: WalletId,
        #[source]
        source: anyhow::Error,
    },

    #[error("Transfer from wallet with id: {sender_id} to wallet with id: {receiver_id} failed.")]
    TransferFailed {
        sender_id: WalletId,
        receiver_id: WalletId,
        #[source]
        source: anyhow::Error,
    },

    #[error("Timed out waiting for wallet {0}; retry the operation")]
    LockTimeout(WalletId),

    #[error("Invalid request: {}", format_field_errors(.0))]
    Validation(Vec<FieldError>),

    #[error("Storage error: {0}")]
    Storage(#[from] anyhow::Error),
}

fn format_field_errors(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl LedgerError {
    /// Stable machine-readable identifier for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::NotFound(_) => "wallet_not_found",
            LedgerError::NameConflict(_) => "wallet_name_conflict",
            LedgerError::CurrencyMismatch { .. } => "currency_mismatch",
            LedgerError::InsufficientFunds { .. } => "insufficient_funds",
            LedgerError::SameWalletTransfer(_) => "same_wallet_transfer",
            LedgerError::DepositFailed { .. } => "deposit_failed",
            LedgerError::WithdrawFailed { .. } => "withdraw_failed",
            LedgerError::TransferFailed { .. } => "transfer_failed",
            LedgerError::LockTimeout(_) => "lock_timeout",
            LedgerError::Validation(_) => "invalid_request",
            LedgerError::Storage(_) => "storage_error",
        }
    }

    pub fn status(&self) -> ErrorStatus {
        match self {
            LedgerError::NotFound(_) => ErrorStatus::NotFound,
            LedgerError::NameConflict(_) => ErrorStatus::Conflict,
            LedgerError::CurrencyMismatch { .. }
            | LedgerError::InsufficientFunds { .. }
            | LedgerError::SameWalletTransfer(_)
            | LedgerError::Validation(_) => ErrorStatus::BadRequest,
            LedgerError::LockTimeout(_) => ErrorStatus::Unavailable,
            LedgerError::DepositFailed { .. }
            | LedgerError::WithdrawFailed { .. }
            | LedgerError::TransferFailed { .. }
            | LedgerError::Storage(_) => ErrorStatus::Internal,
        }
    }

    /// Returns true if the same call may succeed when simply retried.
    pub fn is_retriable(&self) -> bool {
        matches!(self, LedgerError::LockTimeout(_))
    }

    /// Returns true for the per-operation failures that leave a Failed record behind.
    pub fn is_operation_failure(&self) -> bool {
        matches!(
            self,
            LedgerError::DepositFailed { .. }
                | LedgerError::WithdrawFailed { .. }
                | LedgerError::TransferFailed { .. }
        )
    }
}
