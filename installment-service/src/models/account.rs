//! Lease account model.
//!
//! Accounts are created by the surrounding CRUD application; the ledger
//! treats them as read-mostly. `remaining_balance` seeds the installment
//! chain and stops being authoritative after the first posting.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Collection cadence of a lease account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ProcessType {
    Daily,
    Weekly,
    Monthly,
}

impl ProcessType {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "daily" => Some(Self::Daily),
            "weekly" => Some(Self::Weekly),
            "monthly" => Some(Self::Monthly),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProcessType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lease account terms plus the cached seed balance.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct LeaseAccount {
    pub account_id: Uuid,
    pub acc_no: String,
    pub process_type: String,
    pub installment_price: Decimal,
    pub advance: Decimal,
    pub monthly_installment: Decimal,
    pub duration: i32,
    pub remaining_balance: Decimal,
    pub created_utc: DateTime<Utc>,
}

impl LeaseAccount {
    /// Get parsed process type.
    pub fn parsed_process_type(&self) -> Option<ProcessType> {
        ProcessType::from_str(&self.process_type)
    }
}
