//! Outstanding aggregator: derives the per-account outstanding snapshot
//! from the ledger and replaces the stored record wholesale. Incremental
//! patching would drift from the ledger under edits and deletes, so the
//! snapshot is always rebuilt from source.

use std::sync::Arc;

use futures::{stream, StreamExt};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    AccountFilter, OutstandingRecord, OutstandingStatus, RefreshFailure, RefreshSummary,
};
use crate::services::ledger::AccountLocks;
use crate::services::metrics::OUTSTANDING_REFRESH_TOTAL;
use crate::services::{LedgerError, LedgerStore};

pub struct OutstandingAggregator {
    store: Arc<dyn LedgerStore>,
    locks: Arc<AccountLocks>,
    /// Upper bound on concurrent per-account refreshes in a batch run.
    concurrency: usize,
}

impl OutstandingAggregator {
    pub fn new(store: Arc<dyn LedgerStore>, locks: Arc<AccountLocks>, concurrency: usize) -> Self {
        Self {
            store,
            locks,
            concurrency: concurrency.max(1),
        }
    }

    /// Rebuild one account's snapshot from its ledger chain.
    ///
    /// Runs under the account lock so it never observes a half-applied
    /// cascade. Preserves the coordinator-owned officer assignment, and
    /// preserves a `cleared` status while the amount stays at zero; a
    /// positive amount reopens the record.
    #[instrument(skip(self))]
    pub async fn refresh_one(&self, account_id: Uuid) -> Result<OutstandingRecord, LedgerError> {
        let lock = self.locks.for_account(account_id);
        let _guard = lock.lock().await;

        let account = self
            .store
            .account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        let chain = self.store.chain(account_id).await?;
        let previous = self.store.outstanding(account_id).await?;

        let (tail_balance, tail_outstanding, last_payment_date) = match chain.last() {
            Some(tail) => (tail.balance, tail.outstanding, Some(tail.install_date)),
            None => (
                account.remaining_balance,
                account.remaining_balance,
                None,
            ),
        };

        let pending_installments = (account.duration - chain.len() as i32).max(0);
        // Account-level settle floor: the raw figure may be negative on
        // over-payment, which is reported through the reconciliation flag.
        let outstanding_amount = tail_outstanding.max(Decimal::ZERO);
        let reconciliation_required = tail_balance < -account.advance;

        let status = if outstanding_amount > Decimal::ZERO {
            OutstandingStatus::Active
        } else {
            previous
                .as_ref()
                .and_then(|p| p.parsed_status())
                .unwrap_or(OutstandingStatus::Active)
        };

        let record = OutstandingRecord {
            account_id,
            outstanding_amount,
            pending_installments,
            last_payment_date,
            recovery_officer_id: previous.as_ref().and_then(|p| p.recovery_officer_id),
            status: status.as_str().to_string(),
            reconciliation_required,
        };

        self.store.replace_outstanding(&record).await?;
        OUTSTANDING_REFRESH_TOTAL.with_label_values(&["ok"]).inc();

        if reconciliation_required {
            warn!(
                account_id = %account_id,
                tail_balance = %tail_balance,
                "Outstanding snapshot flagged for reconciliation"
            );
        }

        Ok(record)
    }

    /// Batch refresh: fan out per-account recomputes across bounded worker
    /// tasks. One account failing is recorded and skipped; the run
    /// continues. Cancellation is cooperative, checked between accounts.
    #[instrument(skip(self, filter, cancel))]
    pub async fn refresh_all(
        &self,
        filter: &AccountFilter,
        cancel: &CancellationToken,
    ) -> Result<RefreshSummary, LedgerError> {
        let account_ids = self.store.account_ids(filter).await?;
        let total = account_ids.len();
        info!(accounts = total, "Outstanding batch refresh started");

        let mut summary = RefreshSummary::default();

        let mut results = stream::iter(account_ids)
            .map(|account_id| {
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some((account_id, self.refresh_one(account_id).await))
                }
            })
            .buffer_unordered(self.concurrency);

        while let Some(item) = results.next().await {
            match item {
                None => {
                    OUTSTANDING_REFRESH_TOTAL
                        .with_label_values(&["skipped"])
                        .inc();
                }
                Some((_, Ok(_))) => summary.succeeded += 1,
                Some((account_id, Err(e))) => {
                    OUTSTANDING_REFRESH_TOTAL
                        .with_label_values(&["error"])
                        .inc();
                    warn!(account_id = %account_id, error = %e, "Snapshot refresh failed; continuing");
                    summary.failed += 1;
                    summary.failures.push(RefreshFailure {
                        account_id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        summary.cancelled = cancel.is_cancelled();

        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Outstanding batch refresh finished"
        );

        Ok(summary)
    }
}
