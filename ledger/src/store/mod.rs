//! Account store abstraction.
//!
//! A store holds accounts and transaction records. Money movement happens in
//! an [`AtomicUnit`]: a scope that owns exclusive locks on the accounts it has
//! touched and stages every write until [`AtomicUnit::commit`]. Dropping a
//! unit without committing discards its writes and releases its locks.

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use wallet_common::{AccountId, TransactionId, WalletError};

use crate::account::Account;
use crate::balance::LedgerTotals;
use crate::journal::TransactionRecord;
use crate::query::TransactionFilter;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryAccountStore;
pub use postgres::PgAccountStore;

/// Raw failures surfaced by a store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Waiting for an account lock exceeded the store's lock timeout.
    #[error("Lock wait on account {0} timed out")]
    LockTimeout(AccountId),

    /// A write would violate a uniqueness or check constraint.
    #[error("Constraint violated: {0}")]
    Constraint(String),

    /// A balance write was attempted on an account this unit has not locked.
    #[error("Account {0} is not locked by this unit")]
    NotLocked(AccountId),

    /// The store is not configured to run.
    #[error("Store configuration error: {0}")]
    Configuration(String),

    /// The underlying database failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for WalletError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Constraint(reason) => WalletError::ConflictingState(reason),
            StoreError::LockTimeout(_) | StoreError::Database(_) => {
                WalletError::StoreFailure(err.to_string())
            }
            StoreError::Configuration(reason) => WalletError::Configuration(reason),
            StoreError::NotLocked(_) => WalletError::Internal(err.to_string()),
        }
    }
}

/// Persistent home of accounts and transaction records.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Atomic unit type opened by [`AccountStore::begin`].
    type Unit: AtomicUnit;

    /// Open a new atomic unit.
    async fn begin(&self) -> StoreResult<Self::Unit>;

    /// Insert a freshly opened account.
    async fn insert_account(&self, account: &Account) -> StoreResult<()>;

    /// Read the last committed state of an account without locking it.
    async fn find_account(&self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Read a committed record.
    async fn find_record(&self, id: TransactionId) -> StoreResult<Option<TransactionRecord>>;

    /// Committed records the account owns or is counterparty to, newest first.
    async fn list_records(
        &self,
        account: AccountId,
        filter: &TransactionFilter,
        offset: u64,
        limit: u32,
    ) -> StoreResult<Vec<TransactionRecord>>;
}

/// An all-or-nothing group of locked reads and staged writes.
#[async_trait]
pub trait AtomicUnit: Send {
    /// Lock an account for the rest of the unit and return its current state.
    ///
    /// Returns `None` if the account does not exist. Locking an account this
    /// unit already holds returns the unit's view without blocking.
    async fn lock_for_update(&mut self, id: AccountId) -> StoreResult<Option<Account>>;

    /// Stage a new balance for a locked account.
    async fn set_balance(&mut self, id: AccountId, balance: Decimal) -> StoreResult<()>;

    /// Stage a transaction record.
    async fn insert_record(&mut self, record: &TransactionRecord) -> StoreResult<()>;

    /// Credit and debit totals over the committed records the account owns,
    /// read inside this unit.
    async fn ledger_totals(&mut self, account: AccountId) -> StoreResult<LedgerTotals>;

    /// Apply every staged write and release all locks.
    async fn commit(self) -> StoreResult<()>;
}
