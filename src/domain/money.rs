use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Money is represented as an arbitrary-precision decimal so that no amount
/// is ever rounded on its way through the ledger.
pub type Amount = Decimal;

/// The fixed set of currencies a wallet can be denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    Czk,
    Eur,
}

impl Currency {
    pub const ALL: [Currency; 2] = [Currency::Czk, Currency::Eur];

    pub fn as_str(&self) -> &'static str {
        match self {
            Currency::Czk => "CZK",
            Currency::Eur => "EUR",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "CZK" => Some(Currency::Czk),
            "EUR" => Some(Currency::Eur),
            _ => None,
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Format an amount with at least two decimal places.
/// Example: 50 -> "50.00", 12.345 -> "12.345"
pub fn format_amount(amount: Amount) -> String {
    let normalized = amount.normalize();
    if normalized.scale() < 2 {
        let mut padded = normalized;
        padded.rescale(2);
        padded.to_string()
    } else {
        normalized.to_string()
    }
}

/// Parse a positive decimal string into an amount.
/// Example: "50.00" -> 50.00, "12.5" -> 12.5, "100" -> 100
pub fn parse_amount(input: &str) -> Result<Amount, ParseAmountError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ParseAmountError::InvalidFormat);
    }

    let amount = Decimal::from_str(input).map_err(|_| ParseAmountError::InvalidFormat)?;
    if amount <= Decimal::ZERO {
        return Err(ParseAmountError::NotPositive);
    }
    Ok(amount)
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseAmountError {
    #[error("invalid money format")]
    InvalidFormat,

    #[error("amount must be positive")]
    NotPositive,
}
