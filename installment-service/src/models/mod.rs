//! Domain models for installment-service.

mod account;
mod installment;
mod outstanding;

pub use account::{LeaseAccount, ProcessType};
pub use installment::{
    FineType, Installment, InstallmentPatch, PaymentMethod, PostInstallment,
};
pub use outstanding::{
    AccountFilter, OutstandingRecord, OutstandingStatus, RefreshFailure, RefreshSummary,
};
