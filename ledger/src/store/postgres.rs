//! PostgreSQL account store.
//!
//! An atomic unit is a database transaction. `lock_for_update` issues
//! `SELECT ... FOR UPDATE`, so row locks are held until commit or rollback.
//! Dropping an uncommitted [`PgUnit`] rolls the transaction back.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Executor, Postgres, QueryBuilder, Row, Transaction};
use tracing::{debug, info, warn};
use uuid::Uuid;
use wallet_common::{AccountId, TransactionId};

use super::{AccountStore, AtomicUnit, StoreError, StoreResult};
use crate::account::{Account, AccountProfile};
use crate::balance::LedgerTotals;
use crate::config::StoreConfig;
use crate::journal::TransactionRecord;
use crate::query::TransactionFilter;

/// Schema applied by [`PgAccountStore::migrate`].
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    id            UUID PRIMARY KEY,
    first_name    TEXT NOT NULL,
    last_name     TEXT NOT NULL,
    phone_number  TEXT NOT NULL UNIQUE,
    address       TEXT NOT NULL,
    balance       NUMERIC(19, 2) NOT NULL DEFAULT 0 CHECK (balance >= 0),
    created_at    TIMESTAMPTZ NOT NULL,
    updated_at    TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS transactions (
    id               UUID PRIMARY KEY,
    account_id       UUID NOT NULL REFERENCES accounts (id),
    direction        TEXT NOT NULL,
    kind             TEXT NOT NULL,
    amount           NUMERIC(19, 2) NOT NULL CHECK (amount > 0),
    balance_before   NUMERIC(19, 2) NOT NULL,
    balance_after    NUMERIC(19, 2) NOT NULL,
    counterparty_id  UUID REFERENCES accounts (id),
    description      TEXT NOT NULL,
    status           TEXT NOT NULL,
    reference        UUID UNIQUE,
    created_at       TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS transactions_account_created_idx
    ON transactions (account_id, created_at DESC);
CREATE INDEX IF NOT EXISTS transactions_counterparty_created_idx
    ON transactions (counterparty_id, created_at DESC);
"#;

const ACCOUNT_COLUMNS: &str =
    "id, first_name, last_name, phone_number, address, balance, created_at, updated_at";

const RECORD_COLUMNS: &str = "id, account_id, direction, kind, amount, balance_before, \
     balance_after, counterparty_id, description, status, reference, created_at";

/// Postgres SQLSTATE for `lock_timeout` expiry.
const LOCK_NOT_AVAILABLE: &str = "55P03";
/// Postgres SQLSTATEs for rows the schema refuses to store.
const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";

/// Whether a SQLSTATE means the write itself is invalid, so retrying cannot help.
fn is_constraint_code(code: &str) -> bool {
    matches!(
        code,
        UNIQUE_VIOLATION | CHECK_VIOLATION | FOREIGN_KEY_VIOLATION | NUMERIC_VALUE_OUT_OF_RANGE
    )
}

/// Classify a database error into a raw store failure.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() || db.code().as_deref().is_some_and(is_constraint_code) {
            return StoreError::Constraint(db.message().to_string());
        }
    }
    StoreError::Database(err)
}

fn is_lock_timeout(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some(LOCK_NOT_AVAILABLE))
}

fn decode_err(err: impl std::error::Error + Send + Sync + 'static) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(err))
}

fn account_from_row(row: &PgRow) -> Result<Account, sqlx::Error> {
    Ok(Account {
        id: AccountId::from_uuid(row.try_get("id")?),
        profile: AccountProfile {
            first_name: row.try_get("first_name")?,
            last_name: row.try_get("last_name")?,
            phone_number: row.try_get("phone_number")?,
            address: row.try_get("address")?,
        },
        balance: row.try_get("balance")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn record_from_row(row: &PgRow) -> Result<TransactionRecord, sqlx::Error> {
    let direction: String = row.try_get("direction")?;
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let counterparty: Option<Uuid> = row.try_get("counterparty_id")?;
    let reference: Option<Uuid> = row.try_get("reference")?;

    Ok(TransactionRecord {
        id: TransactionId::from_uuid(row.try_get("id")?),
        account_id: AccountId::from_uuid(row.try_get("account_id")?),
        direction: direction.parse().map_err(decode_err)?,
        kind: kind.parse().map_err(decode_err)?,
        amount: row.try_get("amount")?,
        balance_before: row.try_get("balance_before")?,
        balance_after: row.try_get("balance_after")?,
        counterparty_id: counterparty.map(AccountId::from_uuid),
        description: row.try_get("description")?,
        status: status.parse().map_err(decode_err)?,
        reference: reference.map(TransactionId::from_uuid),
        created_at: row.try_get("created_at")?,
    })
}

/// Account store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgAccountStore {
    /// Connect a pool using the store configuration.
    pub async fn connect(config: &StoreConfig) -> StoreResult<Self> {
        let url = config
            .database_url
            .as_deref()
            .ok_or_else(|| StoreError::Configuration("database URL is not set".into()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect(url)
            .await?;

        info!(
            max_connections = config.max_connections,
            "Connected to account database"
        );

        Ok(Self::from_pool(pool, config.lock_timeout))
    }

    /// Wrap an existing pool.
    pub fn from_pool(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Create tables and indexes if they do not exist.
    pub async fn migrate(&self) -> StoreResult<()> {
        (&self.pool).execute(SCHEMA).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    type Unit = PgUnit;

    async fn begin(&self) -> StoreResult<PgUnit> {
        let mut tx = self.pool.begin().await?;

        // SET LOCAL cannot take bind parameters.
        let statement = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        (&mut *tx).execute(statement.as_str()).await?;

        Ok(PgUnit {
            tx,
            locked: HashSet::new(),
        })
    }

    async fn insert_account(&self, account: &Account) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO accounts (id, first_name, last_name, phone_number, address, balance, \
             created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(account.id.as_uuid())
        .bind(&account.profile.first_name)
        .bind(&account.profile.last_name)
        .bind(&account.profile.phone_number)
        .bind(&account.profile.address)
        .bind(account.balance)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn find_account(&self, id: AccountId) -> StoreResult<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(account_from_row).transpose()?)
    }

    async fn find_record(&self, id: TransactionId) -> StoreResult<Option<TransactionRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM transactions WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(record_from_row).transpose()?)
    }

    async fn list_records(
        &self,
        account: AccountId,
        filter: &TransactionFilter,
        offset: u64,
        limit: u32,
    ) -> StoreResult<Vec<TransactionRecord>> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {RECORD_COLUMNS} FROM transactions WHERE (account_id = "
        ));
        query.push_bind(*account.as_uuid());
        query.push(" OR counterparty_id = ");
        query.push_bind(*account.as_uuid());
        query.push(")");

        if let Some(kind) = filter.kind {
            query.push(" AND kind = ").push_bind(kind.as_str());
        }
        if let Some(since) = filter.since {
            query.push(" AND created_at >= ").push_bind(since);
        }
        if let Some(until) = filter.until {
            query.push(" AND created_at <= ").push_bind(until);
        }

        query.push(" ORDER BY created_at DESC, id DESC LIMIT ");
        query.push_bind(i64::from(limit));
        query.push(" OFFSET ");
        query.push_bind(i64::try_from(offset).unwrap_or(i64::MAX));

        let rows = query.build().fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?)
    }
}

/// Atomic unit over [`PgAccountStore`].
pub struct PgUnit {
    tx: Transaction<'static, Postgres>,
    locked: HashSet<AccountId>,
}

#[async_trait]
impl AtomicUnit for PgUnit {
    async fn lock_for_update(&mut self, id: AccountId) -> StoreResult<Option<Account>> {
        // Re-locking a row this transaction already holds does not block in Postgres.
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1 FOR UPDATE");
        let row = sqlx::query(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(|err| {
                if is_lock_timeout(&err) {
                    warn!(account = %id, "Lock wait timed out");
                    StoreError::LockTimeout(id)
                } else {
                    classify(err)
                }
            })?;

        let account = row.as_ref().map(account_from_row).transpose()?;
        if account.is_some() {
            self.locked.insert(id);
            debug!(account = %id, "Account locked");
        }

        Ok(account)
    }

    async fn set_balance(&mut self, id: AccountId, balance: Decimal) -> StoreResult<()> {
        if !self.locked.contains(&id) {
            return Err(StoreError::NotLocked(id));
        }

        sqlx::query("UPDATE accounts SET balance = $1, updated_at = NOW() WHERE id = $2")
            .bind(balance)
            .bind(id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(classify)?;

        Ok(())
    }

    async fn insert_record(&mut self, record: &TransactionRecord) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO transactions (id, account_id, direction, kind, amount, balance_before, \
             balance_after, counterparty_id, description, status, reference, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(record.id.as_uuid())
        .bind(record.account_id.as_uuid())
        .bind(record.direction.as_str())
        .bind(record.kind.as_str())
        .bind(record.amount)
        .bind(record.balance_before)
        .bind(record.balance_after)
        .bind(record.counterparty_id.map(|id| *id.as_uuid()))
        .bind(&record.description)
        .bind(record.status.as_str())
        .bind(record.reference.map(|id| *id.as_uuid()))
        .bind(record.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(classify)?;

        Ok(())
    }

    async fn ledger_totals(&mut self, account: AccountId) -> StoreResult<LedgerTotals> {
        let row = sqlx::query(
            "SELECT \
                 COALESCE(SUM(CASE WHEN direction = 'CREDIT' THEN amount ELSE 0 END), 0) AS credits, \
                 COALESCE(SUM(CASE WHEN direction = 'DEBIT' THEN amount ELSE 0 END), 0) AS debits, \
                 COUNT(*) AS records \
             FROM transactions WHERE account_id = $1",
        )
        .bind(account.as_uuid())
        .fetch_one(&mut *self.tx)
        .await?;

        let records: i64 = row.try_get("records")?;
        Ok(LedgerTotals {
            credits: row.try_get("credits")?,
            debits: row.try_get("debits")?,
            records: records.max(0) as u64,
        })
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await.map_err(classify)?;
        debug!(accounts = self.locked.len(), "Atomic unit committed");
        Ok(())
    }
}
