use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Amount, Currency};

pub type WalletId = Uuid;

/// Wallet names are between 3 and 50 characters long.
pub const WALLET_NAME_MIN_LEN: usize = 3;
pub const WALLET_NAME_MAX_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub id: WalletId,
    pub name: String,
    pub currency: Currency,
    /// Only the ledger engine writes this field.
    pub balance: Amount,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create a new, empty wallet.
    pub fn new(name: String, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name,
            currency,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn can_cover(&self, amount: Amount) -> bool {
        amount <= self.balance
    }

    pub(crate) fn credit(&mut self, amount: Amount) {
        self.balance += amount;
        self.updated_at = Utc::now();
    }

    pub(crate) fn debit(&mut self, amount: Amount) {
        self.balance -= amount;
        self.updated_at = Utc::now();
    }
}
