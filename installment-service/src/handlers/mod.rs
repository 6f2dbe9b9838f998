//! HTTP handlers for installment-service.

pub mod installments;
pub mod outstanding;
