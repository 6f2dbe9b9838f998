//! Installment model: one posting in an account's ledger chain.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How the `fine` field is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FineType {
    /// `fine` is an absolute amount.
    Fixed,
    /// `fine` is a percentage of the configured base.
    Percentage,
}

impl FineType {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Percentage => "percentage",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "fixed" => Some(Self::Fixed),
            "percentage" => Some(Self::Percentage),
            _ => None,
        }
    }
}

impl std::fmt::Display for FineType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Payment channel of a posting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Bank,
    Check,
    Online,
}

impl PaymentMethod {
    /// Get string representation for database.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Bank => "bank",
            Self::Check => "check",
            Self::Online => "online",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "cash" => Some(Self::Cash),
            "bank" => Some(Self::Bank),
            "check" => Some(Self::Check),
            "online" => Some(Self::Online),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One posted installment.
///
/// Chain invariant: ordered by (`install_date`, `id`) within an account,
/// `pre_balance` equals the predecessor's `balance` (the account's
/// `remaining_balance` for the first posting).
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Installment {
    pub id: Uuid,
    pub account_id: Uuid,
    pub recv_no: i32,
    pub install_date: NaiveDate,
    pub pre_balance: Decimal,
    pub install_charge: Decimal,
    /// Raw fine as entered; the effective amount is derived through the
    /// fine policy.
    pub fine: Decimal,
    pub fine_type: String,
    pub discount: Decimal,
    pub balance: Decimal,
    pub outstanding: Decimal,
    pub payment_method: String,
    pub bank_account_id: Option<Uuid>,
    pub officer_id: Option<Uuid>,
    pub sms_sent: bool,
    pub notes: Option<String>,
    pub posted_utc: DateTime<Utc>,
}

impl Installment {
    /// Get parsed fine type.
    pub fn parsed_fine_type(&self) -> Option<FineType> {
        FineType::from_str(&self.fine_type)
    }

    /// Get parsed payment method.
    pub fn parsed_payment_method(&self) -> Option<PaymentMethod> {
        PaymentMethod::from_str(&self.payment_method)
    }
}

/// Input for posting a new installment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostInstallment {
    pub account_id: Uuid,
    pub install_date: NaiveDate,
    pub install_charge: Decimal,
    pub fine: Decimal,
    pub fine_type: FineType,
    pub discount: Decimal,
    pub payment_method: PaymentMethod,
    pub bank_account_id: Option<Uuid>,
    pub officer_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// Partial update of an existing installment. `None` fields are left as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallmentPatch {
    pub install_date: Option<NaiveDate>,
    pub install_charge: Option<Decimal>,
    pub fine: Option<Decimal>,
    pub fine_type: Option<FineType>,
    pub discount: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    pub bank_account_id: Option<Uuid>,
    pub officer_id: Option<Uuid>,
    /// Set by the SMS dispatch flow once a receipt notification goes out.
    pub sms_sent: Option<bool>,
    pub notes: Option<String>,
}
