use std::collections::HashMap;

use super::{Amount, Transaction, Wallet, WalletId};

/// Compute the balance for a single wallet from its transaction history.
/// Balance = completed incoming movements - completed outgoing movements
pub fn compute_balance(wallet_id: WalletId, transactions: &[Transaction]) -> Amount {
    transactions
        .iter()
        .fold(Amount::ZERO, |balance, tx| balance + tx.effect_on(wallet_id))
}

/// Compute balances for all wallets touched by a list of transactions.
pub fn compute_all_balances(transactions: &[Transaction]) -> HashMap<WalletId, Amount> {
    let mut balances: HashMap<WalletId, Amount> = HashMap::new();

    for tx in transactions {
        for wallet_id in [tx.sender_wallet, tx.receiver_wallet].into_iter().flatten() {
            *balances.entry(wallet_id).or_insert(Amount::ZERO) += tx.effect_on(wallet_id);
        }
    }

    balances
}

/// A wallet whose stored balance disagrees with its transaction history.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceDiscrepancy {
    pub wallet_id: WalletId,
    pub wallet_name: String,
    pub stored: Amount,
    pub computed: Amount,
}

/// Result of comparing stored balances against the transaction log.
#[derive(Debug, Clone, Default)]
pub struct IntegrityReport {
    pub wallet_count: usize,
    pub transaction_count: usize,
    pub pending_count: usize,
    pub failed_count: usize,
    pub negative_balances: Vec<WalletId>,
    pub discrepancies: Vec<BalanceDiscrepancy>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        self.negative_balances.is_empty() && self.discrepancies.is_empty()
    }
}

pub fn build_integrity_report(wallets: &[Wallet], transactions: &[Transaction]) -> IntegrityReport {
    use super::TransactionStatus;

    let computed = compute_all_balances(transactions);
    let mut report = IntegrityReport {
        wallet_count: wallets.len(),
        transaction_count: transactions.len(),
        pending_count: transactions
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Pending)
            .count(),
        failed_count: transactions
            .iter()
            .filter(|tx| tx.status == TransactionStatus::Failed)
            .count(),
        ..Default::default()
    };

    for wallet in wallets {
        if wallet.balance < Amount::ZERO {
            report.negative_balances.push(wallet.id);
        }
        let expected = computed.get(&wallet.id).copied().unwrap_or(Amount::ZERO);
        if expected != wallet.balance {
            report.discrepancies.push(BalanceDiscrepancy {
                wallet_id: wallet.id,
                wallet_name: wallet.name.clone(),
                stored: wallet.balance,
                computed: expected,
            });
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use super::*;
    use crate::domain::{BankRef, Currency, TransactionStatus};

    fn completed(mut tx: Transaction) -> Transaction {
        tx.status = TransactionStatus::Completed;
        tx
    }

    fn bank() -> BankRef {
        BankRef::new("1234567890", "0800")
    }

    #[test]
    fn test_compute_balance_empty() {
        assert_eq!(compute_balance(Uuid::new_v4(), &[]), Amount::ZERO);
    }

    #[test]
    fn test_compute_balance_mixed() {
        let checking = Uuid::new_v4();
        let savings = Uuid::new_v4();

        let transactions = vec![
            completed(Transaction::deposit(checking, Currency::Eur, dec!(100), bank())),
            completed(Transaction::withdrawal(checking, Currency::Eur, dec!(15.25), bank())),
            completed(Transaction::transfer(checking, savings, Currency::Eur, dec!(40))),
        ];

        assert_eq!(compute_balance(checking, &transactions), dec!(44.75));
        assert_eq!(compute_balance(savings, &transactions), dec!(40));
    }

    #[test]
    fn test_pending_and_failed_are_ignored() {
        let wallet = Uuid::new_v4();
        let mut failed = Transaction::deposit(wallet, Currency::Eur, dec!(30), bank());
        failed.status = TransactionStatus::Failed;

        let transactions = vec![
            Transaction::deposit(wallet, Currency::Eur, dec!(10), bank()),
            failed,
            completed(Transaction::deposit(wallet, Currency::Eur, dec!(5), bank())),
        ];

        assert_eq!(compute_balance(wallet, &transactions), dec!(5));
    }

    #[test]
    fn test_compute_all_balances() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let transactions = vec![
            completed(Transaction::deposit(a, Currency::Czk, dec!(500), bank())),
            completed(Transaction::transfer(a, b, Currency::Czk, dec!(200))),
        ];

        let balances = compute_all_balances(&transactions);
        assert_eq!(balances.get(&a), Some(&dec!(300)));
        assert_eq!(balances.get(&b), Some(&dec!(200)));
    }

    #[test]
    fn test_integrity_report_flags_discrepancy() {
        let mut wallet = Wallet::new("Checking".into(), Currency::Eur);
        let tx = completed(Transaction::deposit(wallet.id, Currency::Eur, dec!(10), bank()));

        let report = build_integrity_report(std::slice::from_ref(&wallet), std::slice::from_ref(&tx));
        assert_eq!(report.discrepancies.len(), 1);
        assert!(!report.is_healthy());

        wallet.balance = dec!(10);
        let report = build_integrity_report(&[wallet], &[tx]);
        assert!(report.is_healthy());
        assert_eq!(report.transaction_count, 1);
    }
}
