//! Ledger error taxonomy.

use chrono::NaiveDate;
use service_core::error::AppError;
use thiserror::Error;
use uuid::Uuid;

use crate::services::metrics::ERRORS_TOTAL;

/// Errors raised by the ledger engine. Validation and state-guard failures
/// abort a single operation with no partial write; storage failures wrap the
/// backing-store error. Nothing here is fatal to the process.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("install_charge is required and must be greater than zero")]
    InstallChargeRequired,

    #[error("payment_method 'bank' requires an active bank account")]
    BankAccountRequired,

    #[error("install_date {proposed} is earlier than the latest posting on {latest}")]
    OutOfOrderPosting {
        proposed: NaiveDate,
        latest: NaiveDate,
    },

    #[error("fine and discount must not be negative")]
    NegativeAdjustment,

    #[error("lease account {0} not found")]
    AccountNotFound(Uuid),

    #[error("installment {0} not found")]
    InstallmentNotFound(Uuid),

    #[error("no outstanding record for account {0}")]
    OutstandingNotFound(Uuid),

    #[error("account {account_id} still carries an outstanding amount of {outstanding_amount}")]
    StillOutstanding {
        account_id: Uuid,
        outstanding_amount: rust_decimal::Decimal,
    },

    #[error("storage error: {0}")]
    Storage(#[source] anyhow::Error),
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InstallChargeRequired
            | LedgerError::BankAccountRequired
            | LedgerError::OutOfOrderPosting { .. }
            | LedgerError::NegativeAdjustment => {
                ERRORS_TOTAL.with_label_values(&["validation_error"]).inc();
                AppError::BadRequest(anyhow::anyhow!("{err}"))
            }
            LedgerError::AccountNotFound(_)
            | LedgerError::InstallmentNotFound(_)
            | LedgerError::OutstandingNotFound(_) => {
                ERRORS_TOTAL.with_label_values(&["not_found"]).inc();
                AppError::NotFound(anyhow::anyhow!("{err}"))
            }
            LedgerError::StillOutstanding { .. } => {
                ERRORS_TOTAL.with_label_values(&["state_conflict"]).inc();
                AppError::Conflict(anyhow::anyhow!("{err}"))
            }
            LedgerError::Storage(source) => {
                ERRORS_TOTAL.with_label_values(&["db_error"]).inc();
                AppError::DatabaseError(source)
            }
        }
    }
}
