//! Outstanding snapshot models.
//!
//! An `OutstandingRecord` is a derived view, one row per account, rebuilt
//! from the ledger by the aggregator rather than patched incrementally.
//! No refresh timestamp is stored: re-running a refresh against an
//! unchanged ledger must produce an identical row.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::ProcessType;

/// Snapshot lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum OutstandingStatus {
    Active,
    Cleared,
}

impl OutstandingStatus {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Cleared => "cleared",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "cleared" => Some(Self::Cleared),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutstandingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Derived outstanding snapshot for one account.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct OutstandingRecord {
    pub account_id: Uuid,
    pub outstanding_amount: Decimal,
    pub pending_installments: i32,
    pub last_payment_date: Option<NaiveDate>,
    pub recovery_officer_id: Option<Uuid>,
    pub status: String,
    /// Set when the chain tail is over-paid beyond the account's advance;
    /// surfaced for operator review, never auto-retried.
    pub reconciliation_required: bool,
}

impl OutstandingRecord {
    /// Get parsed status.
    pub fn parsed_status(&self) -> Option<OutstandingStatus> {
        OutstandingStatus::from_str(&self.status)
    }

    pub fn is_cleared(&self) -> bool {
        self.parsed_status() == Some(OutstandingStatus::Cleared)
    }
}

/// Account selection for a batch refresh run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountFilter {
    /// Restrict to one collection cadence.
    pub process_type: Option<ProcessType>,
    /// Restrict to explicit accounts; empty/absent means all.
    pub account_ids: Option<Vec<Uuid>>,
}

/// Result of a batch refresh run. Per-account failures never abort the run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub succeeded: u64,
    pub failed: u64,
    pub failures: Vec<RefreshFailure>,
    /// True when the run stopped early on cooperative cancellation.
    pub cancelled: bool,
}

/// One account the batch run could not refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshFailure {
    pub account_id: Uuid,
    pub reason: String,
}
