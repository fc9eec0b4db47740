//! Core ledger engine implementation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use wallet_common::{validate_amount, AccountId, Result, TransactionId, WalletError};

use crate::account::{Account, AccountProfile};
use crate::balance::{BalanceChange, Reconciliation};
use crate::config::LedgerConfig;
use crate::journal::{RecordFactory, TransactionRecord};
use crate::query::{Pagination, TransactionFilter, TransactionPage, TransactionSummary};
use crate::store::{AccountStore, AtomicUnit};

/// Result of a successful top-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopUpReceipt {
    pub transaction_id: TransactionId,
    pub amount: Decimal,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub record: TransactionRecord,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
}

/// Result of a successful transfer, from the sender's side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    /// Sender's debit leg.
    pub record: TransactionRecord,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    /// Recipient's credit leg.
    pub credit_leg_id: TransactionId,
}

/// Lock an account inside a unit, mapping absence to `AccountNotFound`.
async fn lock_account<U: AtomicUnit>(unit: &mut U, id: AccountId) -> Result<Account> {
    unit.lock_for_update(id)
        .await?
        .ok_or(WalletError::AccountNotFound(id))
}

/// Lock two distinct accounts in ascending identifier order.
///
/// Returns the accounts in argument order.
async fn lock_pair<U: AtomicUnit>(
    unit: &mut U,
    a: AccountId,
    b: AccountId,
) -> Result<(Account, Account)> {
    if a <= b {
        let first = lock_account(unit, a).await?;
        let second = lock_account(unit, b).await?;
        Ok((first, second))
    } else {
        let first = lock_account(unit, b).await?;
        let second = lock_account(unit, a).await?;
        Ok((second, first))
    }
}

fn log_failure(operation: &'static str, err: &WalletError) {
    if err.is_rejection() {
        warn!(operation, code = err.error_code(), error = %err, "Operation rejected");
    } else {
        error!(operation, code = err.error_code(), error = %err, "Operation failed");
    }
}

/// The ledger engine moves money between wallet accounts.
///
/// Every mutating operation runs in one [`AtomicUnit`]: all balance writes and
/// record inserts commit together or not at all. Any early return drops the
/// unit, which rolls back and releases its locks.
pub struct LedgerEngine<S: AccountStore> {
    store: Arc<S>,
    config: LedgerConfig,
    records: RecordFactory,
}

impl<S: AccountStore> Clone for LedgerEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            config: self.config.clone(),
            records: self.records,
        }
    }
}

impl<S: AccountStore> LedgerEngine<S> {
    /// Create a new ledger engine.
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            records: RecordFactory::new(),
        }
    }

    /// Underlying account store.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Open a new account with a zero balance.
    #[instrument(skip_all, fields(phone = %profile.phone_number))]
    pub async fn open_account(&self, profile: AccountProfile) -> Result<Account> {
        let account = Account::open(profile);
        self.store
            .insert_account(&account)
            .await
            .map_err(WalletError::from)
            .map_err(|err| {
                log_failure("open_account", &err);
                err
            })?;

        info!(account = %account.id, "Account opened");
        Ok(account)
    }

    /// Get an account's last committed state.
    pub async fn account(&self, id: AccountId) -> Result<Account> {
        self.store
            .find_account(id)
            .await?
            .ok_or(WalletError::AccountNotFound(id))
    }

    /// Get a transaction record.
    pub async fn transaction(&self, id: TransactionId) -> Result<TransactionRecord> {
        self.store
            .find_record(id)
            .await?
            .ok_or(WalletError::TransactionNotFound(id))
    }

    /// Credit an account.
    #[instrument(skip_all, fields(account = %account_id, amount = %amount))]
    pub async fn top_up(&self, account_id: AccountId, amount: Decimal) -> Result<TopUpReceipt> {
        self.apply_top_up(account_id, amount).await.map_err(|err| {
            log_failure("top_up", &err);
            err
        })
    }

    async fn apply_top_up(&self, account_id: AccountId, amount: Decimal) -> Result<TopUpReceipt> {
        let amount = validate_amount(amount)?;
        let mut unit = self.store.begin().await?;

        let account = lock_account(&mut unit, account_id).await?;
        let change = BalanceChange::credit(account.balance, amount)?;
        unit.set_balance(account_id, change.balance_after).await?;

        let record = self.records.top_up(account_id, amount, change);
        unit.insert_record(&record).await?;
        unit.commit().await?;

        info!(
            transaction_id = %record.id,
            balance_before = %change.balance_before,
            balance_after = %change.balance_after,
            "Top-up committed"
        );

        Ok(TopUpReceipt {
            transaction_id: record.id,
            amount,
            balance_before: change.balance_before,
            balance_after: change.balance_after,
            created_at: record.created_at,
        })
    }

    /// Debit an account for a payment.
    #[instrument(skip_all, fields(account = %account_id, amount = %amount))]
    pub async fn payment(
        &self,
        account_id: AccountId,
        amount: Decimal,
        description: &str,
    ) -> Result<PaymentReceipt> {
        self.apply_payment(account_id, amount, description)
            .await
            .map_err(|err| {
                log_failure("payment", &err);
                err
            })
    }

    async fn apply_payment(
        &self,
        account_id: AccountId,
        amount: Decimal,
        description: &str,
    ) -> Result<PaymentReceipt> {
        let amount = validate_amount(amount)?;
        let mut unit = self.store.begin().await?;

        let account = lock_account(&mut unit, account_id).await?;
        let change = BalanceChange::debit(account.balance, amount)?;
        unit.set_balance(account_id, change.balance_after).await?;

        let record = self.records.payment(account_id, amount, change, description);
        unit.insert_record(&record).await?;
        unit.commit().await?;

        info!(
            transaction_id = %record.id,
            balance_before = %change.balance_before,
            balance_after = %change.balance_after,
            "Payment committed"
        );

        Ok(PaymentReceipt {
            record,
            balance_before: change.balance_before,
            balance_after: change.balance_after,
        })
    }

    /// Move funds from `sender` to `recipient`.
    ///
    /// Both accounts are locked in ascending identifier order, so concurrent
    /// transfers in opposite directions between the same pair cannot deadlock.
    /// Transfers to self are rejected.
    #[instrument(skip_all, fields(sender = %sender, recipient = %recipient, amount = %amount))]
    pub async fn transfer(
        &self,
        sender: AccountId,
        recipient: AccountId,
        amount: Decimal,
        description: &str,
    ) -> Result<TransferReceipt> {
        self.apply_transfer(sender, recipient, amount, description)
            .await
            .map_err(|err| {
                log_failure("transfer", &err);
                err
            })
    }

    async fn apply_transfer(
        &self,
        sender: AccountId,
        recipient: AccountId,
        amount: Decimal,
        description: &str,
    ) -> Result<TransferReceipt> {
        if sender == recipient {
            return Err(WalletError::SelfTransfer(sender));
        }
        let amount = validate_amount(amount)?;
        let mut unit = self.store.begin().await?;

        let (sender_account, recipient_account) = lock_pair(&mut unit, sender, recipient).await?;

        let debit = BalanceChange::debit(sender_account.balance, amount)?;
        let credit = BalanceChange::credit(recipient_account.balance, amount)?;

        unit.set_balance(sender, debit.balance_after).await?;
        let debit_leg = self
            .records
            .transfer_debit(sender, recipient, amount, debit, description);
        unit.insert_record(&debit_leg).await?;

        unit.set_balance(recipient, credit.balance_after).await?;
        let credit_leg = self.records.transfer_credit(&debit_leg, credit);
        unit.insert_record(&credit_leg).await?;

        unit.commit().await?;

        info!(
            transaction_id = %debit_leg.id,
            credit_leg_id = %credit_leg.id,
            sender_balance_after = %debit.balance_after,
            recipient_balance_after = %credit.balance_after,
            "Transfer committed"
        );

        Ok(TransferReceipt {
            record: debit_leg,
            balance_before: debit.balance_before,
            balance_after: debit.balance_after,
            credit_leg_id: credit_leg.id,
        })
    }

    /// One page of an account's history, newest first.
    pub async fn get_account_transactions(
        &self,
        account_id: AccountId,
        page: u32,
        limit: u32,
    ) -> Result<TransactionPage> {
        self.account_transactions(account_id, page, limit, &TransactionFilter::default())
            .await
    }

    /// One page of an account's history matching `filter`, newest first.
    #[instrument(skip_all, fields(account = %account_id, page = page, limit = limit))]
    pub async fn account_transactions(
        &self,
        account_id: AccountId,
        page: u32,
        limit: u32,
        filter: &TransactionFilter,
    ) -> Result<TransactionPage> {
        if self.store.find_account(account_id).await?.is_none() {
            return Err(WalletError::AccountNotFound(account_id));
        }

        let pagination = Pagination::normalize(
            page,
            limit,
            self.config.default_page_limit,
            self.config.max_page_limit,
        );
        let records = self
            .store
            .list_records(account_id, filter, pagination.offset(), pagination.limit)
            .await?;

        Ok(TransactionPage {
            items: records.iter().map(TransactionSummary::from).collect(),
            pagination,
        })
    }

    /// Compare an account's balance with the records it owns.
    ///
    /// The account is locked while the totals are read, so no concurrent
    /// operation can move its balance in between. Nothing is written.
    #[instrument(skip_all, fields(account = %account_id))]
    pub async fn reconcile(&self, account_id: AccountId) -> Result<Reconciliation> {
        let mut unit = self.store.begin().await?;
        let account = lock_account(&mut unit, account_id).await?;
        let totals = unit.ledger_totals(account_id).await?;
        drop(unit);

        let reconciliation = Reconciliation {
            account_id,
            balance: account.balance,
            totals,
        };

        if !reconciliation.is_consistent() {
            error!(
                balance = %reconciliation.balance,
                net = %totals.net(),
                "Balance does not match transaction records"
            );
        }

        Ok(reconciliation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::journal::{Direction, TransactionKind, TOP_UP_DESCRIPTION};
    use crate::store::InMemoryAccountStore;
    use rust_decimal_macros::dec;

    fn create_test_engine() -> LedgerEngine<InMemoryAccountStore> {
        LedgerEngine::new(
            Arc::new(InMemoryAccountStore::default()),
            LedgerConfig::default(),
        )
    }

    async fn open(engine: &LedgerEngine<InMemoryAccountStore>, phone: &str) -> AccountId {
        engine
            .open_account(AccountProfile::new("John", "Doe", phone, "123 Main St"))
            .await
            .unwrap()
            .id
    }

    async fn funded(
        engine: &LedgerEngine<InMemoryAccountStore>,
        phone: &str,
        balance: Decimal,
    ) -> AccountId {
        let id = open(engine, phone).await;
        engine.top_up(id, balance).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_top_up() {
        let engine = create_test_engine();
        let id = funded(&engine, "1234567890", dec!(1000)).await;

        let receipt = engine.top_up(id, dec!(500)).await.unwrap();

        assert_eq!(receipt.balance_before, dec!(1000));
        assert_eq!(receipt.balance_after, dec!(1500));
        assert_eq!(engine.account(id).await.unwrap().balance, dec!(1500));

        let record = engine.transaction(receipt.transaction_id).await.unwrap();
        assert_eq!(record.kind, TransactionKind::TopUp);
        assert_eq!(record.direction, Direction::Credit);
        assert_eq!(record.amount, dec!(500));
        assert_eq!(record.description, TOP_UP_DESCRIPTION);
        assert_eq!(record.balance_after, record.balance_before + dec!(500));
    }

    #[tokio::test]
    async fn test_top_up_missing_account() {
        let engine = create_test_engine();
        let missing = AccountId::new();

        let err = engine.top_up(missing, dec!(10)).await.unwrap_err();

        assert_eq!(err, WalletError::AccountNotFound(missing));
        assert_eq!(engine.store().record_count(), 0);
    }

    #[tokio::test]
    async fn test_payment() {
        let engine = create_test_engine();
        let id = funded(&engine, "1234567890", dec!(1000)).await;

        let receipt = engine.payment(id, dec!(300), "Test payment").await.unwrap();

        assert_eq!(receipt.balance_before, dec!(1000));
        assert_eq!(receipt.balance_after, dec!(700));
        assert_eq!(receipt.record.kind, TransactionKind::Payment);
        assert_eq!(receipt.record.direction, Direction::Debit);
        assert_eq!(receipt.record.description, "Test payment");
        assert_eq!(engine.account(id).await.unwrap().balance, dec!(700));
    }

    #[tokio::test]
    async fn test_payment_insufficient_balance() {
        let engine = create_test_engine();
        let id = funded(&engine, "1234567890", dec!(1000)).await;
        let records_before = engine.store().record_count();

        let err = engine.payment(id, dec!(2000), "Test payment").await.unwrap_err();

        assert_eq!(
            err,
            WalletError::InsufficientBalance {
                required: dec!(2000),
                available: dec!(1000),
            }
        );
        assert_eq!(engine.account(id).await.unwrap().balance, dec!(1000));
        assert_eq!(engine.store().record_count(), records_before);
    }

    #[tokio::test]
    async fn test_payment_of_entire_balance() {
        let engine = create_test_engine();
        let id = funded(&engine, "1234567890", dec!(42.50)).await;

        let receipt = engine.payment(id, dec!(42.50), "all in").await.unwrap();

        assert_eq!(receipt.balance_after, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_top_up_then_payment_then_overdraft() {
        let engine = create_test_engine();
        let id = funded(&engine, "1234567890", dec!(1000)).await;

        let top_up = engine.top_up(id, dec!(500)).await.unwrap();
        assert_eq!((top_up.balance_before, top_up.balance_after), (dec!(1000), dec!(1500)));

        let payment = engine.payment(id, dec!(300), "groceries").await.unwrap();
        assert_eq!((payment.balance_before, payment.balance_after), (dec!(1500), dec!(1200)));

        let err = engine.payment(id, dec!(2000), "too much").await.unwrap_err();
        assert!(matches!(err, WalletError::InsufficientBalance { .. }));
        assert_eq!(engine.account(id).await.unwrap().balance, dec!(1200));
    }

    #[tokio::test]
    async fn test_transfer() {
        let engine = create_test_engine();
        let alice = funded(&engine, "+621", dec!(1000)).await;
        let bob = funded(&engine, "+622", dec!(50)).await;

        let receipt = engine.transfer(alice, bob, dec!(400), "rent").await.unwrap();

        assert_eq!(receipt.balance_before, dec!(1000));
        assert_eq!(receipt.balance_after, dec!(600));
        assert_eq!(receipt.record.direction, Direction::Debit);
        assert_eq!(receipt.record.kind, TransactionKind::Transfer);
        assert_eq!(receipt.record.counterparty_id, Some(bob));

        let credit = engine.transaction(receipt.credit_leg_id).await.unwrap();
        assert_eq!(credit.account_id, bob);
        assert_eq!(credit.direction, Direction::Credit);
        assert_eq!(credit.reference, Some(receipt.record.id));
        assert_eq!(credit.balance_before, dec!(50));
        assert_eq!(credit.balance_after, dec!(450));

        let a = engine.account(alice).await.unwrap().balance;
        let b = engine.account(bob).await.unwrap().balance;
        assert_eq!((a, b), (dec!(600), dec!(450)));
        assert_eq!(a + b, dec!(1050));
    }

    #[tokio::test]
    async fn test_transfer_insufficient_balance() {
        let engine = create_test_engine();
        let alice = funded(&engine, "+621", dec!(100)).await;
        let bob = funded(&engine, "+622", dec!(100)).await;
        let records_before = engine.store().record_count();

        let err = engine.transfer(alice, bob, dec!(100.01), "x").await.unwrap_err();

        assert!(matches!(err, WalletError::InsufficientBalance { .. }));
        assert_eq!(engine.account(alice).await.unwrap().balance, dec!(100));
        assert_eq!(engine.account(bob).await.unwrap().balance, dec!(100));
        assert_eq!(engine.store().record_count(), records_before);

        // Both locks were released by the aborted unit.
        engine.transfer(bob, alice, dec!(10), "after abort").await.unwrap();
    }

    #[tokio::test]
    async fn test_transfer_to_missing_recipient() {
        let engine = create_test_engine();
        let alice = funded(&engine, "+621", dec!(100)).await;
        let missing = AccountId::new();

        let err = engine.transfer(alice, missing, dec!(10), "x").await.unwrap_err();

        assert_eq!(err, WalletError::AccountNotFound(missing));
        assert_eq!(engine.account(alice).await.unwrap().balance, dec!(100));
    }

    #[tokio::test]
    async fn test_self_transfer_rejected() {
        let engine = create_test_engine();
        let alice = funded(&engine, "+621", dec!(100)).await;

        let err = engine.transfer(alice, alice, dec!(10), "me").await.unwrap_err();

        assert_eq!(err, WalletError::SelfTransfer(alice));
        assert_eq!(engine.store().record_count(), 1);
    }

    #[tokio::test]
    async fn test_invalid_amounts_rejected_before_locking() {
        let engine = create_test_engine();
        let id = open(&engine, "+621").await;

        for amount in [Decimal::ZERO, dec!(-5), dec!(0.001)] {
            let err = engine.top_up(id, amount).await.unwrap_err();
            assert!(matches!(err, WalletError::InvalidAmount(_)));
        }
        assert_eq!(engine.store().record_count(), 0);
    }

    #[tokio::test]
    async fn test_amount_beyond_column_range_rejected() {
        let engine = create_test_engine();
        let id = open(&engine, "+621").await;

        let err = engine.top_up(id, Decimal::MAX).await.unwrap_err();

        assert!(matches!(err, WalletError::InvalidAmount(_)));
        assert_eq!(engine.account(id).await.unwrap().balance, Decimal::ZERO);
        assert_eq!(engine.store().record_count(), 0);
    }

    #[tokio::test]
    async fn test_top_up_past_balance_ceiling() {
        let engine = create_test_engine();
        let id = funded(&engine, "+621", wallet_common::MAX_BALANCE).await;

        let err = engine.top_up(id, dec!(1)).await.unwrap_err();

        assert_eq!(
            err,
            WalletError::BalanceLimitExceeded {
                balance: wallet_common::MAX_BALANCE,
                amount: dec!(1),
            }
        );
        assert!(err.is_rejection());
        assert_eq!(
            engine.account(id).await.unwrap().balance,
            wallet_common::MAX_BALANCE
        );
        assert_eq!(engine.store().record_count(), 1);

        // The failed unit released its lock.
        engine.payment(id, dec!(1), "after ceiling").await.unwrap();
    }

    #[tokio::test]
    async fn test_transfer_into_full_account() {
        let engine = create_test_engine();
        let alice = funded(&engine, "+621", dec!(100)).await;
        let bob = funded(&engine, "+622", wallet_common::MAX_BALANCE).await;
        let records_before = engine.store().record_count();

        let err = engine.transfer(alice, bob, dec!(10), "x").await.unwrap_err();

        assert!(matches!(err, WalletError::BalanceLimitExceeded { .. }));
        assert_eq!(engine.account(alice).await.unwrap().balance, dec!(100));
        assert_eq!(
            engine.account(bob).await.unwrap().balance,
            wallet_common::MAX_BALANCE
        );
        assert_eq!(engine.store().record_count(), records_before);

        engine.transfer(bob, alice, dec!(10), "after abort").await.unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_phone_is_conflict() {
        let engine = create_test_engine();
        open(&engine, "+621").await;

        let err = engine
            .open_account(AccountProfile::new("Other", "Person", "+621", "Elsewhere"))
            .await
            .unwrap_err();

        assert!(matches!(err, WalletError::ConflictingState(_)));
    }

    #[tokio::test]
    async fn test_history_pagination() {
        let engine = create_test_engine();
        let id = open(&engine, "+621").await;
        for _ in 0..15 {
            engine.top_up(id, dec!(1)).await.unwrap();
        }

        let page = engine.get_account_transactions(id, 1, 10).await.unwrap();
        assert_eq!(page.len(), 10);
        assert_eq!(page.pagination, Pagination { page: 1, limit: 10 });
        assert!(page
            .items
            .windows(2)
            .all(|w| w[0].created_at >= w[1].created_at));
        assert_eq!(page.items[0].balance_after, dec!(15));

        let rest = engine.get_account_transactions(id, 2, 10).await.unwrap();
        assert_eq!(rest.len(), 5);
        assert_eq!(rest.items[4].balance_after, dec!(1));

        let normalized = engine.get_account_transactions(id, 0, 1000).await.unwrap();
        assert_eq!(normalized.pagination, Pagination { page: 1, limit: 10 });
    }

    #[tokio::test]
    async fn test_history_includes_counterparty_legs() {
        let engine = create_test_engine();
        let alice = funded(&engine, "+621", dec!(100)).await;
        let bob = open(&engine, "+622").await;
        engine.transfer(alice, bob, dec!(30), "split").await.unwrap();

        let bob_history = engine.get_account_transactions(bob, 1, 10).await.unwrap();
        assert_eq!(bob_history.len(), 2);
        assert!(bob_history
            .items
            .iter()
            .any(|s| s.account_id == bob && s.direction == Direction::Credit));

        let transfers_only = engine
            .account_transactions(alice, 1, 10, &TransactionFilter::kind(TransactionKind::Transfer))
            .await
            .unwrap();
        assert_eq!(transfers_only.len(), 2);
        assert!(transfers_only
            .items
            .iter()
            .all(|s| s.kind == TransactionKind::Transfer));
    }

    #[tokio::test]
    async fn test_history_of_missing_account() {
        let engine = create_test_engine();
        let missing = AccountId::new();

        let err = engine.get_account_transactions(missing, 1, 10).await.unwrap_err();
        assert_eq!(err, WalletError::AccountNotFound(missing));
    }

    #[tokio::test]
    async fn test_unknown_transaction() {
        let engine = create_test_engine();
        let id = TransactionId::new();

        assert_eq!(
            engine.transaction(id).await.unwrap_err(),
            WalletError::TransactionNotFound(id)
        );
    }

    #[tokio::test]
    async fn test_reconcile() {
        let engine = create_test_engine();
        let alice = funded(&engine, "+621", dec!(1000)).await;
        let bob = open(&engine, "+622").await;
        engine.payment(alice, dec!(250), "x").await.unwrap();
        engine.transfer(alice, bob, dec!(100), "y").await.unwrap();

        let alice_rec = engine.reconcile(alice).await.unwrap();
        assert!(alice_rec.is_consistent());
        assert_eq!(alice_rec.balance, dec!(650));
        assert_eq!(alice_rec.totals.credits, dec!(1000));
        assert_eq!(alice_rec.totals.debits, dec!(350));
        assert_eq!(alice_rec.totals.records, 3);

        let bob_rec = engine.reconcile(bob).await.unwrap();
        assert!(bob_rec.is_consistent());
        assert_eq!(bob_rec.totals.records, 1);
    }
}
