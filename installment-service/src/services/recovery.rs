//! Recovery assignment coordinator: officer assignment and clearing of
//! outstanding snapshots.

use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::OutstandingRecord;
use crate::services::ledger::AccountLocks;
use crate::services::{LedgerError, LedgerStore};

/// Coordinator-side mutations share the per-account locks with the ledger
/// service and the aggregator, so a refresh can never interleave with an
/// officer assignment or a clear on the same account.
pub struct RecoveryCoordinator {
    store: Arc<dyn LedgerStore>,
    locks: Arc<AccountLocks>,
}

impl RecoveryCoordinator {
    pub fn new(store: Arc<dyn LedgerStore>, locks: Arc<AccountLocks>) -> Self {
        Self { store, locks }
    }

    /// Bulk-assign a recovery officer to the accounts' outstanding records.
    /// Accounts without a record are skipped, not errors.
    #[instrument(skip(self, account_ids), fields(count = account_ids.len(), officer_id = %officer_id))]
    pub async fn assign_officer(
        &self,
        account_ids: &[Uuid],
        officer_id: Uuid,
    ) -> Result<u64, LedgerError> {
        let mut updated = 0;
        for &account_id in account_ids {
            let lock = self.locks.for_account(account_id);
            let _guard = lock.lock().await;
            if self
                .store
                .assign_recovery_officer(account_id, officer_id)
                .await?
            {
                updated += 1;
            }
        }
        info!(updated = updated, "Recovery officer assigned");
        Ok(updated)
    }

    /// Mark an account's snapshot as cleared.
    ///
    /// Only callable once the outstanding amount has reached zero; this is
    /// the snapshot state machine's one enforced transition guard. Clearing
    /// is terminal until a later refresh finds new unpaid postings.
    #[instrument(skip(self))]
    pub async fn clear_outstanding(
        &self,
        account_id: Uuid,
    ) -> Result<OutstandingRecord, LedgerError> {
        let lock = self.locks.for_account(account_id);
        let _guard = lock.lock().await;

        let record = self
            .store
            .outstanding(account_id)
            .await?
            .ok_or(LedgerError::OutstandingNotFound(account_id))?;

        if record.outstanding_amount > Decimal::ZERO {
            return Err(LedgerError::StillOutstanding {
                account_id,
                outstanding_amount: record.outstanding_amount,
            });
        }

        // The store re-checks the guard inside the write itself, covering
        // writers that do not go through the in-process locks.
        let cleared = self.store.clear_if_settled(account_id).await?.ok_or(
            LedgerError::StillOutstanding {
                account_id,
                outstanding_amount: record.outstanding_amount,
            },
        )?;

        info!(account_id = %account_id, "Outstanding record cleared");
        Ok(cleared)
    }
}
