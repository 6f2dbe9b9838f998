//! Validation gate for proposed installment postings.
//!
//! Pure checks, no persistence: the ledger service resolves the account,
//! chain tail, and bank-account state first, then runs the gate. A posting
//! that fails here is rejected whole; nothing is partially written.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::models::{Installment, PaymentMethod, PostInstallment};
use crate::services::LedgerError;

/// Validate a proposed posting against the resolved account state.
///
/// `bank_account_active` is the collaborator lookup result for the proposed
/// `bank_account_id`, `None` when no id was supplied.
pub fn validate_posting(
    input: &PostInstallment,
    chain_tail: Option<&Installment>,
    bank_account_active: Option<bool>,
) -> Result<(), LedgerError> {
    validate_amounts(input.install_charge, input.fine, input.discount)?;
    validate_bank_account(input.payment_method, bank_account_active)?;
    if let Some(tail) = chain_tail {
        validate_date_order(input.install_date, tail.install_date)?;
    }
    Ok(())
}

/// `install_charge` must be positive; fine and discount must not be negative.
pub fn validate_amounts(
    install_charge: Decimal,
    fine: Decimal,
    discount: Decimal,
) -> Result<(), LedgerError> {
    if install_charge <= Decimal::ZERO {
        return Err(LedgerError::InstallChargeRequired);
    }
    if fine < Decimal::ZERO || discount < Decimal::ZERO {
        return Err(LedgerError::NegativeAdjustment);
    }
    Ok(())
}

/// Bank postings must name an existing, active bank account.
pub fn validate_bank_account(
    payment_method: PaymentMethod,
    bank_account_active: Option<bool>,
) -> Result<(), LedgerError> {
    if payment_method == PaymentMethod::Bank && bank_account_active != Some(true) {
        return Err(LedgerError::BankAccountRequired);
    }
    Ok(())
}

/// The ledger is append-in-time-order; back-dated corrections go through
/// update, not insert.
pub fn validate_date_order(proposed: NaiveDate, latest: NaiveDate) -> Result<(), LedgerError> {
    if proposed < latest {
        return Err(LedgerError::OutOfOrderPosting { proposed, latest });
    }
    Ok(())
}
