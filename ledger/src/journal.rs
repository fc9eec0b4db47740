//! Transaction records and the factory that creates them.
//!
//! Records are immutable once built. Identifiers and timestamps are assigned
//! by [`RecordFactory`] in the engine, before the record reaches a store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wallet_common::{AccountId, TransactionId};

use crate::balance::BalanceChange;

/// Description stored on every top-up record.
pub const TOP_UP_DESCRIPTION: &str = "Top up balance";

/// Direction of a record relative to its owning account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    /// Increases the owner's balance.
    Credit,
    /// Decreases the owner's balance.
    Debit,
}

/// Operation that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    #[serde(rename = "TOPUP")]
    TopUp,
    Payment,
    Transfer,
}

/// Record status. Failed attempts never produce a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
}

/// Error parsing a stored enum value.
#[derive(Debug, Error)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "CREDIT",
            Direction::Debit => "DEBIT",
        }
    }
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::TopUp => "TOPUP",
            TransactionKind::Payment => "PAYMENT",
            TransactionKind::Transfer => "TRANSFER",
        }
    }
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "SUCCESS",
        }
    }
}

impl FromStr for Direction {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREDIT" => Ok(Direction::Credit),
            "DEBIT" => Ok(Direction::Debit),
            other => Err(ParseEnumError {
                kind: "direction",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for TransactionKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "TOPUP" => Ok(TransactionKind::TopUp),
            "PAYMENT" => Ok(TransactionKind::Payment),
            "TRANSFER" => Ok(TransactionKind::Transfer),
            other => Err(ParseEnumError {
                kind: "transaction kind",
                value: other.to_string(),
            }),
        }
    }
}

impl FromStr for TransactionStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(TransactionStatus::Success),
            other => Err(ParseEnumError {
                kind: "status",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An immutable record of one balance-affecting operation on one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    /// Unique record ID.
    pub id: TransactionId,
    /// Account whose balance this record documents.
    pub account_id: AccountId,
    /// Credit or debit, relative to `account_id`.
    pub direction: Direction,
    /// Operation that produced the record.
    pub kind: TransactionKind,
    /// Positive amount moved.
    pub amount: Decimal,
    /// Owner balance before the write.
    pub balance_before: Decimal,
    /// Owner balance after the write.
    pub balance_after: Decimal,
    /// Other party of a transfer.
    pub counterparty_id: Option<AccountId>,
    /// Free-text description.
    pub description: String,
    pub status: TransactionStatus,
    /// On a transfer's credit leg, the debit leg's ID.
    pub reference: Option<TransactionId>,
    /// When this record was created.
    pub created_at: DateTime<Utc>,
}

impl TransactionRecord {
    /// Amount with the sign of its effect on the owner's balance.
    pub fn signed_amount(&self) -> Decimal {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }

    /// Whether `account` owns this record or is its counterparty.
    pub fn involves(&self, account: AccountId) -> bool {
        self.account_id == account || self.counterparty_id == Some(account)
    }
}

/// Assigns identifiers and timestamps to new records.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordFactory;

impl RecordFactory {
    pub fn new() -> Self {
        Self
    }

    /// CREDIT/TOPUP record.
    pub fn top_up(
        &self,
        account_id: AccountId,
        amount: Decimal,
        change: BalanceChange,
    ) -> TransactionRecord {
        self.build(
            account_id,
            Direction::Credit,
            TransactionKind::TopUp,
            amount,
            change,
            None,
            TOP_UP_DESCRIPTION.to_string(),
            None,
        )
    }

    /// DEBIT/PAYMENT record.
    pub fn payment(
        &self,
        account_id: AccountId,
        amount: Decimal,
        change: BalanceChange,
        description: impl Into<String>,
    ) -> TransactionRecord {
        self.build(
            account_id,
            Direction::Debit,
            TransactionKind::Payment,
            amount,
            change,
            None,
            description.into(),
            None,
        )
    }

    /// Sender's DEBIT/TRANSFER leg.
    pub fn transfer_debit(
        &self,
        sender: AccountId,
        recipient: AccountId,
        amount: Decimal,
        change: BalanceChange,
        description: impl Into<String>,
    ) -> TransactionRecord {
        self.build(
            sender,
            Direction::Debit,
            TransactionKind::Transfer,
            amount,
            change,
            Some(recipient),
            description.into(),
            None,
        )
    }

    /// Recipient's CREDIT/TRANSFER leg, referencing the debit leg.
    pub fn transfer_credit(
        &self,
        debit_leg: &TransactionRecord,
        change: BalanceChange,
    ) -> TransactionRecord {
        let recipient = debit_leg.counterparty_id.unwrap_or(debit_leg.account_id);

        self.build(
            recipient,
            Direction::Credit,
            TransactionKind::Transfer,
            debit_leg.amount,
            change,
            Some(debit_leg.account_id),
            debit_leg.description.clone(),
            Some(debit_leg.id),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        account_id: AccountId,
        direction: Direction,
        kind: TransactionKind,
        amount: Decimal,
        change: BalanceChange,
        counterparty_id: Option<AccountId>,
        description: String,
        reference: Option<TransactionId>,
    ) -> TransactionRecord {
        TransactionRecord {
            id: TransactionId::new(),
            account_id,
            direction,
            kind,
            amount,
            balance_before: change.balance_before,
            balance_after: change.balance_after,
            counterparty_id,
            description,
            status: TransactionStatus::Success,
            reference,
            created_at: wallet_common::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_top_up_record() {
        let account = AccountId::new();
        let record = RecordFactory::new().top_up(
            account,
            dec!(500),
            BalanceChange::credit(dec!(1000), dec!(500)).unwrap(),
        );

        assert_eq!(record.direction, Direction::Credit);
        assert_eq!(record.kind, TransactionKind::TopUp);
        assert_eq!(record.description, TOP_UP_DESCRIPTION);
        assert_eq!(record.balance_after, dec!(1500));
        assert_eq!(record.signed_amount(), dec!(500));
        assert!(record.counterparty_id.is_none());
        assert!(record.reference.is_none());
    }

    #[test]
    fn test_factory_never_reuses_ids() {
        let factory = RecordFactory::new();
        let account = AccountId::new();
        let change = BalanceChange::credit(Decimal::ZERO, dec!(1)).unwrap();

        let a = factory.top_up(account, dec!(1), change);
        let b = factory.top_up(account, dec!(1), change);
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_transfer_legs_are_linked() {
        let factory = RecordFactory::new();
        let sender = AccountId::new();
        let recipient = AccountId::new();

        let debit = factory.transfer_debit(
            sender,
            recipient,
            dec!(250),
            BalanceChange::debit(dec!(1000), dec!(250)).unwrap(),
            "rent",
        );
        let leg = BalanceChange::credit(dec!(10), dec!(250)).unwrap();
        let credit = factory.transfer_credit(&debit, leg);

        assert_eq!(debit.signed_amount(), dec!(-250));
        assert_eq!(credit.account_id, recipient);
        assert_eq!(credit.counterparty_id, Some(sender));
        assert_eq!(credit.reference, Some(debit.id));
        assert_eq!(credit.description, "rent");
        assert_eq!(credit.balance_after, dec!(260));

        assert!(debit.involves(sender));
        assert!(debit.involves(recipient));
        assert!(!debit.involves(AccountId::new()));
    }

    #[test]
    fn test_enum_round_trip_through_text() {
        for kind in [
            TransactionKind::TopUp,
            TransactionKind::Payment,
            TransactionKind::Transfer,
        ] {
            assert_eq!(kind.as_str().parse::<TransactionKind>().unwrap(), kind);
        }
        assert!("REFUND".parse::<TransactionKind>().is_err());
        assert!("credit".parse::<Direction>().is_err());
    }

    #[test]
    fn test_serialized_names() {
        assert_eq!(
            serde_json::to_string(&TransactionKind::TopUp).unwrap(),
            "\"TOPUP\""
        );
        assert_eq!(
            serde_json::to_string(&Direction::Debit).unwrap(),
            "\"DEBIT\""
        );
        assert_eq!(
            serde_json::to_string(&TransactionStatus::Success).unwrap(),
            "\"SUCCESS\""
        );
    }
}
