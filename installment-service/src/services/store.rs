//! Storage seam between the ledger engine and its backing store.
//!
//! `Database` implements this over Postgres; `MemoryStore` backs the test
//! suites and local development. Multi-row chain rewrites must be atomic in
//! every implementation so a crash mid-cascade cannot leave mismatched
//! `pre_balance`/`balance` pairs.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{AccountFilter, Installment, LeaseAccount, OutstandingRecord};
use crate::services::LedgerError;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Liveness probe for health checks.
    async fn ping(&self) -> Result<(), LedgerError>;

    // -- Lease accounts (read-only to the ledger) --

    async fn account(&self, account_id: Uuid) -> Result<Option<LeaseAccount>, LedgerError>;

    async fn account_ids(&self, filter: &AccountFilter) -> Result<Vec<Uuid>, LedgerError>;

    /// Whether the bank account exists and is active. Consulted only for
    /// bank postings.
    async fn bank_account_active(&self, bank_account_id: Uuid) -> Result<bool, LedgerError>;

    // -- Installment chain --

    /// Full chain for an account, ordered by (`install_date`, `id`).
    async fn chain(&self, account_id: Uuid) -> Result<Vec<Installment>, LedgerError>;

    /// Latest installment in chain order, if any.
    async fn chain_tail(&self, account_id: Uuid) -> Result<Option<Installment>, LedgerError>;

    async fn installment(&self, id: Uuid) -> Result<Option<Installment>, LedgerError>;

    /// Next receipt number for the account. Callers hold the per-account
    /// lock, so read-then-insert is not racy.
    async fn next_recv_no(&self, account_id: Uuid) -> Result<i32, LedgerError>;

    async fn insert_installment(&self, row: &Installment) -> Result<(), LedgerError>;

    /// Atomically apply a cascade: rewrite the given nodes and optionally
    /// remove one, as a single transaction.
    async fn rewrite_chain(
        &self,
        account_id: Uuid,
        upserts: &[Installment],
        delete: Option<Uuid>,
    ) -> Result<(), LedgerError>;

    // -- Outstanding snapshots --

    async fn outstanding(&self, account_id: Uuid) -> Result<Option<OutstandingRecord>, LedgerError>;

    /// Replace (not merge) the account's snapshot row.
    async fn replace_outstanding(&self, record: &OutstandingRecord) -> Result<(), LedgerError>;

    /// Assign a recovery officer to the account's snapshot. Returns `false`
    /// when the account has no record.
    async fn assign_recovery_officer(
        &self,
        account_id: Uuid,
        officer_id: Uuid,
    ) -> Result<bool, LedgerError>;

    /// Mark the snapshot `cleared`, but only while `outstanding_amount <= 0`;
    /// the guard and the write are one atomic step. Returns the cleared
    /// record, or `None` when there is no record or the guard fails.
    async fn clear_if_settled(
        &self,
        account_id: Uuid,
    ) -> Result<Option<OutstandingRecord>, LedgerError>;

    /// Mark the snapshot as needing operator reconciliation. No-op when the
    /// account has no snapshot yet.
    async fn flag_reconciliation(&self, account_id: Uuid) -> Result<(), LedgerError>;
}
