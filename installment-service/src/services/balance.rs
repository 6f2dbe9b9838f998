//! Pure balance arithmetic for one installment.
//!
//! The surrounding application never computes balances itself; both the
//! ledger service (on insert) and the re-chaining cascade (on update/delete)
//! call into here.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::FineType;

/// Base the percentage fine is taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FineBase {
    InstallCharge,
    PreBalance,
}

/// Fine handling policy. Both knobs correspond to behaviors the upstream
/// system leaves ambiguous, so they are configuration instead of constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinePolicy {
    pub percentage_base: FineBase,
    /// Whether effective fines are added into `outstanding` figures. They
    /// never reduce `balance` either way: a fine is a penalty owed, not a
    /// reduction of principal.
    pub include_fines_in_outstanding: bool,
}

impl Default for FinePolicy {
    fn default() -> Self {
        Self {
            percentage_base: FineBase::InstallCharge,
            include_fines_in_outstanding: true,
        }
    }
}

/// Result of computing one installment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceOutcome {
    pub balance: Decimal,
    pub effective_fine: Decimal,
}

/// Resolve the effective fine amount for a posting.
pub fn effective_fine(
    pre_balance: Decimal,
    install_charge: Decimal,
    fine: Decimal,
    fine_type: FineType,
    policy: &FinePolicy,
) -> Decimal {
    match fine_type {
        FineType::Fixed => fine,
        FineType::Percentage => {
            let base = match policy.percentage_base {
                FineBase::InstallCharge => install_charge,
                FineBase::PreBalance => pre_balance,
            };
            (base * fine / Decimal::ONE_HUNDRED).round_dp(2)
        }
    }
}

/// Compute the closing balance and effective fine for one installment.
///
/// The balance may go negative: over-payment is a valid state that is
/// surfaced to the outstanding snapshot, not clamped here.
pub fn compute(
    pre_balance: Decimal,
    install_charge: Decimal,
    fine: Decimal,
    fine_type: FineType,
    discount: Decimal,
    policy: &FinePolicy,
) -> BalanceOutcome {
    BalanceOutcome {
        balance: pre_balance - install_charge - discount,
        effective_fine: effective_fine(pre_balance, install_charge, fine, fine_type, policy),
    }
}
