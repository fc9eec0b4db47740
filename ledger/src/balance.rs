//! Balance snapshots and reconciliation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use wallet_common::{AccountId, Result, WalletError};

/// Before/after snapshot of a single balance write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    /// Balance before the change.
    pub balance_before: Decimal,
    /// Balance after the change.
    pub balance_after: Decimal,
}

impl BalanceChange {
    /// Credit `amount` onto `balance`, refusing to pass the balance ceiling.
    pub fn credit(balance: Decimal, amount: Decimal) -> Result<Self> {
        Ok(Self {
            balance_before: balance,
            balance_after: wallet_common::checked_credit(balance, amount)?,
        })
    }

    /// Debit `amount` from `balance`, refusing to go below zero.
    pub fn debit(balance: Decimal, amount: Decimal) -> Result<Self> {
        if !wallet_common::has_sufficient_funds(balance, amount) {
            return Err(WalletError::InsufficientBalance {
                required: amount,
                available: balance,
            });
        }

        Ok(Self {
            balance_before: balance,
            balance_after: balance - amount,
        })
    }

    /// Signed difference between after and before.
    pub fn delta(&self) -> Decimal {
        self.balance_after - self.balance_before
    }
}

/// Sums of the amounts recorded against an account, by direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTotals {
    /// Sum of CREDIT amounts.
    pub credits: Decimal,
    /// Sum of DEBIT amounts.
    pub debits: Decimal,
    /// Number of records owned by the account.
    pub records: u64,
}

impl LedgerTotals {
    /// Balance implied by the records.
    pub fn net(&self) -> Decimal {
        self.credits - self.debits
    }
}

/// Outcome of comparing an account balance against its records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    pub account_id: AccountId,
    /// Balance stored on the account.
    pub balance: Decimal,
    /// Totals recomputed from the account's records.
    pub totals: LedgerTotals,
}

impl Reconciliation {
    /// Whether the stored balance equals credits minus debits.
    pub fn is_consistent(&self) -> bool {
        self.balance == self.totals.net()
    }

    /// Stored balance minus the balance implied by the records.
    pub fn discrepancy(&self) -> Decimal {
        self.balance - self.totals.net()
    }
}
