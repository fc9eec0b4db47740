//! Wallet Ledger Engine
//!
//! Top-ups, payments and peer-to-peer transfers with per-account exclusive
//! locking and append-only transaction records. Each operation is one atomic
//! unit against an [`AccountStore`].

pub mod account;
pub mod balance;
pub mod config;
pub mod engine;
pub mod journal;
pub mod query;
pub mod store;

pub use account::{Account, AccountProfile};
pub use balance::{BalanceChange, LedgerTotals, Reconciliation};
pub use config::{LedgerConfig, StoreConfig};
pub use engine::{LedgerEngine, PaymentReceipt, TopUpReceipt, TransferReceipt};
pub use journal::{Direction, RecordFactory, TransactionKind, TransactionRecord, TransactionStatus};
pub use query::{Pagination, TransactionFilter, TransactionPage, TransactionSummary};
pub use store::{AccountStore, AtomicUnit, InMemoryAccountStore, PgAccountStore, StoreError};
