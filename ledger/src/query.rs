//! Transaction history queries.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use wallet_common::{AccountId, TransactionId};

use crate::journal::{Direction, TransactionKind, TransactionRecord, TransactionStatus};

/// Page and limit after normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// 1-based page number.
    pub page: u32,
    /// Records per page.
    pub limit: u32,
}

impl Pagination {
    /// Normalize a caller's request.
    ///
    /// Page 0 becomes page 1. A limit of 0 or above `max_limit` falls back to
    /// `default_limit`.
    pub fn normalize(page: u32, limit: u32, default_limit: usize, max_limit: usize) -> Self {
        let page = page.max(1);
        let limit = if limit == 0 || limit as usize > max_limit {
            default_limit as u32
        } else {
            limit
        };

        Self { page, limit }
    }

    /// Number of records to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// Optional narrowing of a history query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionFilter {
    /// Only records produced by this operation.
    pub kind: Option<TransactionKind>,
    /// Only records created at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Only records created at or before this instant.
    pub until: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    /// Filter on operation kind.
    pub fn kind(kind: TransactionKind) -> Self {
        Self {
            kind: Some(kind),
            ..Default::default()
        }
    }

    /// Restrict to a creation time window.
    pub fn between(mut self, since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self.until = Some(until);
        self
    }

    /// Check a record against the filter.
    pub fn matches(&self, record: &TransactionRecord) -> bool {
        self.kind.map_or(true, |kind| record.kind == kind)
            && self.since.map_or(true, |since| record.created_at >= since)
            && self.until.map_or(true, |until| record.created_at <= until)
    }
}

/// Caller-facing view of a transaction record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub id: TransactionId,
    /// Owner of the record. Differs from the queried account on a peer's leg.
    pub account_id: AccountId,
    pub amount: Decimal,
    pub direction: Direction,
    pub kind: TransactionKind,
    pub description: String,
    pub balance_before: Decimal,
    pub balance_after: Decimal,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl From<&TransactionRecord> for TransactionSummary {
    fn from(record: &TransactionRecord) -> Self {
        Self {
            id: record.id,
            account_id: record.account_id,
            amount: record.amount,
            direction: record.direction,
            kind: record.kind,
            description: record.description.clone(),
            balance_before: record.balance_before,
            balance_after: record.balance_after,
            status: record.status,
            created_at: record.created_at,
        }
    }
}

impl TransactionSummary {
    /// Creation time in the display format.
    pub fn created_date(&self) -> String {
        wallet_common::time::display(&self.created_at)
    }
}

/// One page of an account's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPage {
    /// Newest first.
    pub items: Vec<TransactionSummary>,
    pub pagination: Pagination,
}

impl TransactionPage {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
