//! Error types for wallet ledger operations.

use crate::{AccountId, TransactionId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Main error type for wallet ledger operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    /// Account does not exist.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Transaction record does not exist.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// Debit exceeds the available balance.
    #[error("Insufficient balance: required {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    /// Credit would push the balance past the largest storable value.
    #[error("Balance limit exceeded: balance {balance}, credit {amount}")]
    BalanceLimitExceeded { balance: Decimal, amount: Decimal },

    /// A uniqueness or integrity constraint was violated on write.
    #[error("Conflicting state: {0}")]
    ConflictingState(String),

    /// The underlying store failed. The whole operation is safe to retry.
    #[error("Store failure: {0}")]
    StoreFailure(String),

    /// Amount is not positive or has too many fractional digits.
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Sender and recipient of a transfer are the same account.
    #[error("Cannot transfer to the same account: {0}")]
    SelfTransfer(AccountId),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Broken internal invariant.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl WalletError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalletError::StoreFailure(_))
    }

    /// Check if this error is a rejected request rather than a system fault.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            WalletError::AccountNotFound(_)
                | WalletError::TransactionNotFound(_)
                | WalletError::InsufficientBalance { .. }
                | WalletError::BalanceLimitExceeded { .. }
                | WalletError::InvalidAmount(_)
                | WalletError::SelfTransfer(_)
        )
    }

    /// Get a stable error code for callers.
    pub fn error_code(&self) -> &'static str {
        match self {
            WalletError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            WalletError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            WalletError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            WalletError::BalanceLimitExceeded { .. } => "BALANCE_LIMIT_EXCEEDED",
            WalletError::ConflictingState(_) => "CONFLICTING_STATE",
            WalletError::StoreFailure(_) => "STORE_FAILURE",
            WalletError::InvalidAmount(_) => "INVALID_AMOUNT",
            WalletError::SelfTransfer(_) => "SELF_TRANSFER",
            WalletError::Configuration(_) => "CONFIGURATION_ERROR",
            WalletError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Result type alias for wallet operations.
pub type Result<T> = std::result::Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_only_store_failures_are_retryable() {
        assert!(WalletError::StoreFailure("pool timed out".into()).is_retryable());
        assert!(!WalletError::InsufficientBalance {
            required: dec!(10),
            available: dec!(5),
        }
        .is_retryable());
        assert!(!WalletError::ConflictingState("duplicate reference".into()).is_retryable());
    }

    #[test]
    fn test_rejections() {
        let err = WalletError::InsufficientBalance {
            required: dec!(2000),
            available: dec!(1200),
        };
        assert!(err.is_rejection());
        assert_eq!(err.error_code(), "INSUFFICIENT_BALANCE");
        assert_eq!(
            err.to_string(),
            "Insufficient balance: required 2000, available 1200"
        );

        let limit = WalletError::BalanceLimitExceeded {
            balance: dec!(1),
            amount: dec!(2),
        };
        assert!(limit.is_rejection());
        assert!(!limit.is_retryable());
        assert!(!WalletError::Configuration("bad".into()).is_retryable());

        assert!(!WalletError::StoreFailure("down".into()).is_rejection());
        assert!(!WalletError::Internal("bug".into()).is_rejection());
    }
}
