//! Account definitions for the wallet ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use wallet_common::AccountId;

/// Profile fields carried by an account. Not touched by money movement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub first_name: String,
    pub last_name: String,
    /// Unique across all accounts.
    pub phone_number: String,
    pub address: String,
}

impl AccountProfile {
    /// Create a new profile.
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        phone_number: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            phone_number: phone_number.into(),
            address: address.into(),
        }
    }
}

/// A wallet account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Unique account identifier.
    pub id: AccountId,
    /// Profile fields.
    pub profile: AccountProfile,
    /// Current balance. Never negative.
    pub balance: Decimal,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the balance or profile last changed.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Open a new account with a zero balance.
    pub fn open(profile: AccountProfile) -> Self {
        let now = wallet_common::now();

        Self {
            id: AccountId::new(),
            profile,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account can cover a debit of `amount`.
    pub fn has_sufficient_funds(&self, amount: Decimal) -> bool {
        wallet_common::has_sufficient_funds(self.balance, amount)
    }

    /// Apply a committed balance.
    pub(crate) fn apply_balance(&mut self, balance: Decimal, at: DateTime<Utc>) {
        self.balance = balance;
        self.updated_at = at;
    }
}
