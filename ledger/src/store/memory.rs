//! In-process account store.
//!
//! Each account row carries its own async mutex. An atomic unit keeps the
//! owned guard of every row it locks until it commits or is dropped, so
//! read-modify-write on one account never interleaves while disjoint
//! accounts proceed in parallel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use wallet_common::{AccountId, TransactionId, MAX_BALANCE};

use super::{AccountStore, AtomicUnit, StoreError, StoreResult};
use crate::account::Account;
use crate::balance::LedgerTotals;
use crate::config::StoreConfig;
use crate::journal::{Direction, TransactionRecord};
use crate::query::TransactionFilter;

/// One account and its row lock.
struct AccountRow {
    lock: Arc<Mutex<()>>,
    /// Last committed state.
    state: RwLock<Account>,
}

/// Append-only record log with its unique indexes.
#[derive(Default)]
struct Journal {
    records: Vec<TransactionRecord>,
    by_id: HashMap<TransactionId, usize>,
    references: HashSet<TransactionId>,
}

impl Journal {
    fn check_unique(&self, record: &TransactionRecord) -> StoreResult<()> {
        if self.by_id.contains_key(&record.id) {
            return Err(StoreError::Constraint(format!(
                "duplicate transaction id {}",
                record.id
            )));
        }

        if let Some(reference) = record.reference {
            if self.references.contains(&reference) {
                return Err(StoreError::Constraint(format!(
                    "duplicate reference {}",
                    reference
                )));
            }
        }

        Ok(())
    }

    fn totals(&self, account: AccountId) -> LedgerTotals {
        self.records
            .iter()
            .filter(|r| r.account_id == account)
            .fold(LedgerTotals::default(), |mut totals, r| {
                match r.direction {
                    Direction::Credit => totals.credits += r.amount,
                    Direction::Debit => totals.debits += r.amount,
                }
                totals.records += 1;
                totals
            })
    }

    fn push(&mut self, record: TransactionRecord) {
        self.by_id.insert(record.id, self.records.len());
        if let Some(reference) = record.reference {
            self.references.insert(reference);
        }
        self.records.push(record);
    }
}

struct Shared {
    accounts: DashMap<AccountId, Arc<AccountRow>>,
    phone_numbers: DashMap<String, AccountId>,
    journal: RwLock<Journal>,
}

/// Account store kept entirely in memory.
#[derive(Clone)]
pub struct InMemoryAccountStore {
    shared: Arc<Shared>,
    lock_timeout: Duration,
}

impl InMemoryAccountStore {
    /// Create an empty store.
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                accounts: DashMap::new(),
                phone_numbers: DashMap::new(),
                journal: RwLock::new(Journal::default()),
            }),
            lock_timeout: config.lock_timeout,
        }
    }

    /// Number of committed records across all accounts.
    pub fn record_count(&self) -> usize {
        self.shared.journal.read().records.len()
    }

    /// Number of accounts.
    pub fn account_count(&self) -> usize {
        self.shared.accounts.len()
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new(&StoreConfig::default())
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    type Unit = MemoryUnit;

    async fn begin(&self) -> StoreResult<MemoryUnit> {
        Ok(MemoryUnit {
            shared: self.shared.clone(),
            lock_timeout: self.lock_timeout,
            held: HashMap::new(),
            records: Vec::new(),
        })
    }

    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        if self.shared.accounts.contains_key(&account.id) {
            return Err(StoreError::Constraint(format!(
                "duplicate account id {}",
                account.id
            )));
        }

        match self
            .shared
            .phone_numbers
            .entry(account.profile.phone_number.clone())
        {
            Entry::Occupied(_) => {
                return Err(StoreError::Constraint(format!(
                    "phone number {} already registered",
                    account.profile.phone_number
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(account.id);
            }
        }

        self.shared.accounts.insert(
            account.id,
            Arc::new(AccountRow {
                lock: Arc::new(Mutex::new(())),
                state: RwLock::new(account.clone()),
            }),
        );

        Ok(())
    }

    async fn find_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        Ok(self
            .shared
            .accounts
            .get(&id)
            .map(|row| row.state.read().clone()))
    }

    async fn find_record(&self, id: TransactionId) -> StoreResult<Option<TransactionRecord>> {
        let journal = self.shared.journal.read();
        Ok(journal
            .by_id
            .get(&id)
            .map(|&idx| journal.records[idx].clone()))
    }

    async fn list_records(
        &self,
        account: AccountId,
        filter: &TransactionFilter,
        offset: u64,
        limit: u32,
    ) -> StoreResult<Vec<TransactionRecord>> {
        let journal = self.shared.journal.read();

        // Newest insertion first so the stable sort breaks timestamp ties that way.
        let mut matching: Vec<&TransactionRecord> = journal
            .records
            .iter()
            .rev()
            .filter(|r| r.involves(account) && filter.matches(r))
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(matching
            .into_iter()
            .skip(usize::try_from(offset).unwrap_or(usize::MAX))
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// A locked account inside a unit.
struct HeldRow {
    row: Arc<AccountRow>,
    staged_balance: Option<Decimal>,
    _guard: OwnedMutexGuard<()>,
}

impl HeldRow {
    fn view(&self) -> Account {
        let mut account = self.row.state.read().clone();
        if let Some(balance) = self.staged_balance {
            account.balance = balance;
        }
        account
    }
}

/// Atomic unit over [`InMemoryAccountStore`].
pub struct MemoryUnit {
    shared: Arc<Shared>,
    lock_timeout: Duration,
    held: HashMap<AccountId, HeldRow>,
    records: Vec<TransactionRecord>,
}

impl MemoryUnit {
    /// Accounts currently locked by this unit.
    pub fn locked_accounts(&self) -> Vec<AccountId> {
        self.held.keys().copied().collect()
    }
}

#[async_trait]
impl AtomicUnit for MemoryUnit {
    async fn lock_for_update(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        if let Some(held) = self.held.get(&id) {
            return Ok(Some(held.view()));
        }

        let row = match self.shared.accounts.get(&id) {
            Some(row) => row.value().clone(),
            None => return Ok(None),
        };

        let wait = tokio::time::timeout(self.lock_timeout, row.lock.clone().lock_owned());
        let guard = match wait.await {
            Ok(guard) => guard,
            Err(_) => {
                warn!(
                    account = %id,
                    timeout_ms = self.lock_timeout.as_millis() as u64,
                    "Lock wait timed out"
                );
                return Err(StoreError::LockTimeout(id));
            }
        };
        debug!(account = %id, "Account locked");

        let held = HeldRow {
            row,
            staged_balance: None,
            _guard: guard,
        };
        let account = held.view();
        self.held.insert(id, held);

        Ok(Some(account))
    }

    async fn set_balance(&mut self, id: AccountId, balance: Decimal) -> StoreResult<()> {
        if balance < Decimal::ZERO {
            return Err(StoreError::Constraint(format!(
                "balance of account {} cannot be negative",
                id
            )));
        }
        if balance > MAX_BALANCE {
            return Err(StoreError::Constraint(format!(
                "balance of account {} is out of range",
                id
            )));
        }

        let held = self.held.get_mut(&id).ok_or(StoreError::NotLocked(id))?;
        held.staged_balance = Some(balance);
        Ok(())
    }

    async fn insert_record(&mut self, record: &TransactionRecord) -> StoreResult<()> {
        let staged_conflict = self.records.iter().any(|staged| {
            staged.id == record.id
                || (record.reference.is_some() && staged.reference == record.reference)
        });
        if staged_conflict {
            return Err(StoreError::Constraint(format!(
                "record {} conflicts with a staged record",
                record.id
            )));
        }

        self.shared.journal.read().check_unique(record)?;
        self.records.push(record.clone());
        Ok(())
    }

    async fn ledger_totals(&mut self, account: AccountId) -> StoreResult<LedgerTotals> {
        Ok(self.shared.journal.read().totals(account))
    }

    async fn commit(mut self) -> StoreResult<()> {
        let now = wallet_common::now();
        let mut journal = self.shared.journal.write();

        for record in &self.records {
            journal.check_unique(record)?;
        }

        for held in self.held.values() {
            if let Some(balance) = held.staged_balance {
                held.row.state.write().apply_balance(balance, now);
            }
        }

        let staged = self.records.len();
        for record in self.records.drain(..) {
            journal.push(record);
        }
        drop(journal);

        debug!(
            accounts = self.held.len(),
            records = staged,
            "Atomic unit committed"
        );

        Ok(())
    }
}
