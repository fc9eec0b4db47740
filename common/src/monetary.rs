//! Monetary helpers for wallet amounts.
//!
//! Balances and amounts are plain [`Decimal`] values in the wallet's single
//! currency. Amounts carry at most [`AMOUNT_SCALE`] fractional digits.

use rust_decimal::Decimal;

use crate::error::{Result, WalletError};

/// Number of fractional digits an amount may carry.
pub const AMOUNT_SCALE: u32 = 2;

/// Largest balance or amount the ledger holds: 99,999,999,999,999,999.99,
/// the range of a `NUMERIC(19, 2)` column.
pub const MAX_BALANCE: Decimal = Decimal::from_parts(0x89E7_FFFF, 0x8AC7_2304, 0, false, 2);

/// Validate an amount supplied by a caller.
///
/// The amount must be strictly positive, no larger than [`MAX_BALANCE`] and
/// representable at [`AMOUNT_SCALE`]. Amounts are never rounded silently;
/// trailing zeros beyond the scale are accepted and normalized away.
pub fn validate_amount(amount: Decimal) -> Result<Decimal> {
    if amount <= Decimal::ZERO || amount > MAX_BALANCE {
        return Err(WalletError::InvalidAmount(amount));
    }

    let normalized = amount.normalize();
    if normalized.scale() > AMOUNT_SCALE {
        return Err(WalletError::InvalidAmount(amount));
    }

    Ok(normalized)
}

/// Check whether a balance covers the requested amount.
pub fn has_sufficient_funds(balance: Decimal, amount: Decimal) -> bool {
    balance >= amount
}

/// Add `amount` to `balance`, refusing results above [`MAX_BALANCE`].
pub fn checked_credit(balance: Decimal, amount: Decimal) -> Result<Decimal> {
    balance
        .checked_add(amount)
        .filter(|total| *total <= MAX_BALANCE)
        .ok_or(WalletError::BalanceLimitExceeded { balance, amount })
}
