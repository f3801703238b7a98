//! Request validation.
//!
//! Requests carry raw text as a client supplied it. `validate` checks every
//! field and reports one `FieldError` per offending field; `execute`
//! validates and then calls the engine. The engine itself only checks
//! business rules.

use uuid::Uuid;

use crate::domain::{
    Amount, BankRef, Currency, Transaction, WALLET_NAME_MAX_LEN, WALLET_NAME_MIN_LEN, Wallet,
    WalletId, ParseAmountError, parse_amount,
};
use crate::error::{FieldError, LedgerError};

use super::LedgerEngine;

const ACCOUNT_NUMBER_DIGITS: (usize, usize) = (10, 18);
const BANK_CODE_DIGITS: (usize, usize) = (4, 6);

#[derive(Debug, Clone, Default)]
pub struct CreateWalletRequest {
    pub name: String,
    pub currency: String,
}

#[derive(Debug, Clone, Default)]
pub struct DepositRequest {
    pub wallet_id: String,
    pub currency: String,
    pub amount: String,
    pub account_number: String,
    pub bank_code: String,
}

#[derive(Debug, Clone, Default)]
pub struct WithdrawRequest {
    pub wallet_id: String,
    pub currency: String,
    pub amount: String,
    pub account_number: String,
    pub bank_code: String,
}

#[derive(Debug, Clone, Default)]
pub struct TransferRequest {
    pub sender_wallet_id: String,
    pub receiver_wallet_id: String,
    pub currency: String,
    pub amount: String,
}

/// Lookup of a single wallet (details or history) by id.
#[derive(Debug, Clone, Default)]
pub struct WalletLookupRequest {
    pub wallet_id: String,
}

/// Validated deposit or withdrawal.
#[derive(Debug, Clone, PartialEq)]
pub struct BankMovement {
    pub wallet_id: WalletId,
    pub currency: Currency,
    pub amount: Amount,
    pub bank_ref: BankRef,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidTransfer {
    pub sender_wallet_id: WalletId,
    pub receiver_wallet_id: WalletId,
    pub currency: Currency,
    pub amount: Amount,
}

/// Collects field errors while a request is checked.
#[derive(Debug, Default)]
struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    fn fail(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    fn name(&mut self, field: &'static str, value: &str) -> Option<String> {
        if value.trim().is_empty() {
            self.fail(field, "Wallet name cannot be empty.");
            return None;
        }
        let len = value.chars().count();
        if !(WALLET_NAME_MIN_LEN..=WALLET_NAME_MAX_LEN).contains(&len) {
            self.fail(
                field,
                format!(
                    "Wallet name must be between {} and {} characters.",
                    WALLET_NAME_MIN_LEN, WALLET_NAME_MAX_LEN
                ),
            );
            return None;
        }
        Some(value.to_string())
    }

    fn currency(&mut self, field: &'static str, value: &str) -> Option<Currency> {
        if value.trim().is_empty() {
            self.fail(field, "Currency cannot be null.");
            return None;
        }
        let currency = Currency::from_str(value);
        if currency.is_none() {
            self.fail(field, "Invalid currency type");
        }
        currency
    }

    fn amount(&mut self, field: &'static str, value: &str) -> Option<Amount> {
        if value.trim().is_empty() {
            self.fail(field, "Amount cannot be null.");
            return None;
        }
        match parse_amount(value) {
            Ok(amount) => Some(amount),
            Err(ParseAmountError::NotPositive) => {
                self.fail(field, "Amount must be positive.");
                None
            }
            Err(ParseAmountError::InvalidFormat) => {
                self.fail(field, "Amount must be a decimal number.");
                None
            }
        }
    }

    fn digits(
        &mut self,
        field: &'static str,
        label: &str,
        value: &str,
        (min, max): (usize, usize),
    ) -> Option<String> {
        if value.trim().is_empty() {
            self.fail(field, format!("{label} cannot be empty"));
            return None;
        }
        if !value.chars().all(|c| c.is_ascii_digit()) {
            self.fail(field, format!("{label} must contain only numbers"));
            return None;
        }
        if !(min..=max).contains(&value.len()) {
            self.fail(field, format!("{label} must be between {min} and {max} digits"));
            return None;
        }
        Some(value.to_string())
    }

    fn wallet_id(&mut self, field: &'static str, value: &str) -> Option<WalletId> {
        if value.trim().is_empty() {
            self.fail(field, "Wallet ID cannot be null.");
            return None;
        }
        match Uuid::parse_str(value.trim()) {
            Ok(id) => Some(id),
            Err(_) => {
                self.fail(field, "Invalid wallet ID");
                None
            }
        }
    }

    fn finish<T>(self, value: Option<T>) -> Result<T, LedgerError> {
        match value {
            Some(value) if self.errors.is_empty() => Ok(value),
            _ => Err(LedgerError::Validation(self.errors)),
        }
    }
}

fn check_bank_ref(v: &mut Validator, account_number: &str, bank_code: &str) -> Option<BankRef> {
    let account_number = v.digits(
        "accountNumber",
        "Bank account number",
        account_number,
        ACCOUNT_NUMBER_DIGITS,
    );
    let bank_code = v.digits("bankCode", "Bank code", bank_code, BANK_CODE_DIGITS);
    Some(BankRef::new(account_number?, bank_code?))
}

impl CreateWalletRequest {
    pub fn validate(&self) -> Result<(String, Currency), LedgerError> {
        let mut v = Validator::default();
        let name = v.name("name", &self.name);
        let currency = v.currency("currency", &self.currency);
        let valid = name.zip(currency);
        v.finish(valid)
    }

    pub async fn execute(&self, engine: &LedgerEngine) -> Result<Wallet, LedgerError> {
        let (name, currency) = self.validate()?;
        engine.create_wallet(&name, currency).await
    }
}

fn validate_bank_movement(
    wallet_id: &str,
    currency: &str,
    amount: &str,
    account_number: &str,
    bank_code: &str,
) -> Result<BankMovement, LedgerError> {
    let mut v = Validator::default();
    let wallet_id = v.wallet_id("walletId", wallet_id);
    let currency = v.currency("currency", currency);
    let amount = v.amount("amount", amount);
    let bank_ref = check_bank_ref(&mut v, account_number, bank_code);

    let valid = (|| {
        Some(BankMovement {
            wallet_id: wallet_id?,
            currency: currency?,
            amount: amount?,
            bank_ref: bank_ref?,
        })
    })();
    v.finish(valid)
}

impl DepositRequest {
    pub fn validate(&self) -> Result<BankMovement, LedgerError> {
        validate_bank_movement(
            &self.wallet_id,
            &self.currency,
            &self.amount,
            &self.account_number,
            &self.bank_code,
        )
    }

    pub async fn execute(&self, engine: &LedgerEngine) -> Result<Transaction, LedgerError> {
        let d = self.validate()?;
        engine
            .deposit(d.wallet_id, d.currency, d.amount, d.bank_ref)
            .await
    }
}

impl WithdrawRequest {
    pub fn validate(&self) -> Result<BankMovement, LedgerError> {
        validate_bank_movement(
            &self.wallet_id,
            &self.currency,
            &self.amount,
            &self.account_number,
            &self.bank_code,
        )
    }

    pub async fn execute(&self, engine: &LedgerEngine) -> Result<Transaction, LedgerError> {
        let w = self.validate()?;
        engine
            .withdraw(w.wallet_id, w.currency, w.amount, w.bank_ref)
            .await
    }
}

impl TransferRequest {
    pub fn validate(&self) -> Result<ValidTransfer, LedgerError> {
        let mut v = Validator::default();
        let sender = v.wallet_id("senderWalletId", &self.sender_wallet_id);
        let receiver = v.wallet_id("receiverWalletId", &self.receiver_wallet_id);
        let currency = v.currency("currency", &self.currency);
        let amount = v.amount("amount", &self.amount);

        let valid = (|| {
            Some(ValidTransfer {
                sender_wallet_id: sender?,
                receiver_wallet_id: receiver?,
                currency: currency?,
                amount: amount?,
            })
        })();
        v.finish(valid)
    }

    pub async fn execute(&self, engine: &LedgerEngine) -> Result<Transaction, LedgerError> {
        let t = self.validate()?;
        engine
            .transfer(t.sender_wallet_id, t.receiver_wallet_id, t.currency, t.amount)
            .await
    }
}

impl WalletLookupRequest {
    /// Checks the id format and that the wallet exists.
    pub async fn validate(&self, engine: &LedgerEngine) -> Result<WalletId, LedgerError> {
        let mut v = Validator::default();
        let mut id = v.wallet_id("walletId", &self.wallet_id);
        if let Some(wallet_id) = id {
            if !engine.wallet_exists(wallet_id).await? {
                v.fail("walletId", "Invalid wallet ID");
                id = None;
            }
        }
        v.finish(id)
    }

    pub async fn wallet(&self, engine: &LedgerEngine) -> Result<Wallet, LedgerError> {
        let id = self.validate(engine).await?;
        engine.get_wallet(id).await
    }

    pub async fn history(&self, engine: &LedgerEngine) -> Result<Vec<Transaction>, LedgerError> {
        let id = self.validate(engine).await?;
        engine.history(id).await
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn fields(err: LedgerError) -> Vec<&'static str> {
        match err {
            LedgerError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    fn valid_deposit() -> DepositRequest {
        DepositRequest {
            wallet_id: Uuid::new_v4().to_string(),
            currency: "EUR".into(),
            amount: "100.50".into(),
            account_number: "1234567890".into(),
            bank_code: "0800".into(),
        }
    }

    #[test]
    fn test_create_wallet_valid() {
        let req = CreateWalletRequest {
            name: "Holiday fund".into(),
            currency: "czk".into(),
        };
        assert_eq!(req.validate().unwrap(), ("Holiday fund".to_string(), Currency::Czk));
    }

    #[test]
    fn test_create_wallet_reports_each_field() {
        let req = CreateWalletRequest {
            name: "ab".into(),
            currency: "USD".into(),
        };
        assert_eq!(fields(req.validate().unwrap_err()), vec!["name", "currency"]);

        let req = CreateWalletRequest {
            name: "   ".into(),
            currency: "EUR".into(),
        };
        match req.validate().unwrap_err() {
            LedgerError::Validation(errors) => {
                assert_eq!(errors[0].message, "Wallet name cannot be empty.")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_name_length_bounds() {
        let at_max = CreateWalletRequest {
            name: "x".repeat(WALLET_NAME_MAX_LEN),
            currency: "EUR".into(),
        };
        assert!(at_max.validate().is_ok());

        let over_max = CreateWalletRequest {
            name: "x".repeat(WALLET_NAME_MAX_LEN + 1),
            currency: "EUR".into(),
        };
        assert!(over_max.validate().is_err());
    }

    #[test]
    fn test_deposit_valid() {
        let req = valid_deposit();
        let movement = req.validate().unwrap();
        assert_eq!(movement.amount, dec!(100.50));
        assert_eq!(movement.bank_ref, BankRef::new("1234567890", "0800"));
    }

    #[test]
    fn test_deposit_bank_fields() {
        let mut req = valid_deposit();
        req.account_number = "12345".into();
        req.bank_code = "08a0".into();
        assert_eq!(fields(req.validate().unwrap_err()), vec!["accountNumber", "bankCode"]);

        let mut req = valid_deposit();
        req.account_number = "1".repeat(19);
        req.bank_code = "1234567".into();
        assert_eq!(fields(req.validate().unwrap_err()), vec!["accountNumber", "bankCode"]);
    }

    #[test]
    fn test_withdraw_rejects_non_positive_amount() {
        let req = WithdrawRequest {
            wallet_id: Uuid::new_v4().to_string(),
            currency: "EUR".into(),
            amount: "-5".into(),
            account_number: "1234567890".into(),
            bank_code: "0800".into(),
        };
        match req.validate().unwrap_err() {
            LedgerError::Validation(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].field, "amount");
                assert_eq!(errors[0].message, "Amount must be positive.");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_transfer_bad_ids() {
        let req = TransferRequest {
            sender_wallet_id: "not-a-uuid".into(),
            receiver_wallet_id: String::new(),
            currency: "EUR".into(),
            amount: "1".into(),
        };
        assert_eq!(
            fields(req.validate().unwrap_err()),
            vec!["senderWalletId", "receiverWalletId"]
        );
    }
}
