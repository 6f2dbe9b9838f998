//! Installment Service - Lease installment ledger and outstanding balances.

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod startup;
