//! Services for installment-service.

pub mod balance;
pub mod database;
mod error;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod outstanding;
pub mod recovery;
pub mod store;
pub mod validator;

pub use balance::{BalanceOutcome, FineBase, FinePolicy};
pub use database::Database;
pub use error::LedgerError;
pub use ledger::{AccountLocks, CascadeOutcome, LedgerService};
pub use memory::MemoryStore;
pub use metrics::{get_metrics, init_metrics};
pub use outstanding::OutstandingAggregator;
pub use recovery::RecoveryCoordinator;
pub use store::LedgerStore;
