//! Installment ledger service.
//!
//! Owns the sequential chain of postings per lease account. Every mutation
//! of one account's chain runs under that account's lock, so a cascade never
//! interleaves with a concurrent posting on the same account. Different
//! accounts proceed in parallel.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::models::{Installment, InstallmentPatch, LeaseAccount, PostInstallment};
use crate::services::metrics::INSTALLMENTS_TOTAL;
use crate::services::{balance, validator, FinePolicy, LedgerError, LedgerStore};

/// Per-account mutual exclusion, keyed by `account_id`.
#[derive(Default)]
pub struct AccountLocks {
    locks: DashMap<Uuid, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the account's mutex; lock it across the whole mutation.
    pub fn for_account(&self, account_id: Uuid) -> Arc<Mutex<()>> {
        self.locks.entry(account_id).or_default().clone()
    }
}

/// Result of a chain mutation.
#[derive(Debug, Clone)]
pub struct CascadeOutcome {
    pub account_id: Uuid,
    /// The touched node, `None` after a delete.
    pub installment: Option<Installment>,
    /// How many later nodes the cascade rewrote.
    pub rewritten: usize,
    /// Tail balance went below `-advance`; surfaced, not rejected.
    pub reconciliation_required: bool,
}

pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
    policy: FinePolicy,
    locks: Arc<AccountLocks>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>, policy: FinePolicy, locks: Arc<AccountLocks>) -> Self {
        Self {
            store,
            policy,
            locks,
        }
    }

    /// Post a new installment at the chain tail.
    ///
    /// Resolves `pre_balance` from the tail (or the account's
    /// `remaining_balance` for the first posting), validates, computes, and
    /// persists exactly one new row. Validation failures leave nothing
    /// behind.
    #[instrument(skip(self, input), fields(account_id = %input.account_id))]
    pub async fn post_installment(
        &self,
        input: PostInstallment,
    ) -> Result<Installment, LedgerError> {
        let lock = self.locks.for_account(input.account_id);
        let _guard = lock.lock().await;

        let account = self
            .store
            .account(input.account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(input.account_id))?;

        let bank_active = match input.bank_account_id {
            Some(id) => Some(self.store.bank_account_active(id).await?),
            None => None,
        };

        let tail = self.store.chain_tail(input.account_id).await?;
        validator::validate_posting(&input, tail.as_ref(), bank_active)?;

        let (pre_balance, prior_fines) = match &tail {
            Some(t) => (t.balance, t.outstanding - t.balance),
            None => (account.remaining_balance, Decimal::ZERO),
        };

        let out = balance::compute(
            pre_balance,
            input.install_charge,
            input.fine,
            input.fine_type,
            input.discount,
            &self.policy,
        );
        let outstanding = if self.policy.include_fines_in_outstanding {
            out.balance + prior_fines + out.effective_fine
        } else {
            out.balance
        };

        let recv_no = self.store.next_recv_no(input.account_id).await?;
        let row = Installment {
            id: Uuid::new_v4(),
            account_id: input.account_id,
            recv_no,
            install_date: input.install_date,
            pre_balance,
            install_charge: input.install_charge,
            fine: input.fine,
            fine_type: input.fine_type.as_str().to_string(),
            discount: input.discount,
            balance: out.balance,
            outstanding,
            payment_method: input.payment_method.as_str().to_string(),
            bank_account_id: input.bank_account_id,
            officer_id: input.officer_id,
            sms_sent: false,
            notes: input.notes,
            posted_utc: Utc::now(),
        };

        self.store.insert_installment(&row).await?;
        INSTALLMENTS_TOTAL.with_label_values(&["posted"]).inc();

        info!(
            installment_id = %row.id,
            recv_no = row.recv_no,
            balance = %row.balance,
            "Installment posted"
        );

        if row.balance < -account.advance {
            self.report_over_payment(&account, row.balance).await?;
        }

        Ok(row)
    }

    /// Update an installment and re-propagate the chain.
    ///
    /// The edit cascades forward: every later node's `pre_balance` is reset
    /// to its predecessor's new `balance` and its own figures recomputed.
    /// Nodes before the edited position are never rewritten.
    #[instrument(skip(self, patch))]
    pub async fn update_installment(
        &self,
        id: Uuid,
        patch: InstallmentPatch,
    ) -> Result<CascadeOutcome, LedgerError> {
        let existing = self
            .store
            .installment(id)
            .await?
            .ok_or(LedgerError::InstallmentNotFound(id))?;
        let account_id = existing.account_id;

        let lock = self.locks.for_account(account_id);
        let _guard = lock.lock().await;

        // Re-read under the lock; a concurrent mutation may have run.
        let mut chain = self.store.chain(account_id).await?;
        let old_idx = chain
            .iter()
            .position(|i| i.id == id)
            .ok_or(LedgerError::InstallmentNotFound(id))?;

        let account = self
            .store
            .account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        apply_patch(&mut chain[old_idx], &patch);

        let node = &chain[old_idx];
        validator::validate_amounts(node.install_charge, node.fine, node.discount)?;
        if let Some(method) = node.parsed_payment_method() {
            let bank_active = match node.bank_account_id {
                Some(bid) => Some(self.store.bank_account_active(bid).await?),
                None => None,
            };
            validator::validate_bank_account(method, bank_active)?;
        }

        // A date edit can reorder the chain; cascade from wherever the node
        // now sits or used to sit, whichever is earlier.
        chain.sort_by(|a, b| (a.install_date, a.id).cmp(&(b.install_date, b.id)));
        let new_idx = chain
            .iter()
            .position(|i| i.id == id)
            .expect("edited node is still in the chain");
        let start = old_idx.min(new_idx);

        let changed = recompute_from(&mut chain, start, account.remaining_balance, &self.policy);
        self.store.rewrite_chain(account_id, &changed, None).await?;
        INSTALLMENTS_TOTAL.with_label_values(&["updated"]).inc();

        let tail_balance = chain.last().map(|i| i.balance).unwrap_or(Decimal::ZERO);
        let reconciliation_required = tail_balance < -account.advance;
        if reconciliation_required {
            self.report_over_payment(&account, tail_balance).await?;
        }

        info!(
            installment_id = %id,
            account_id = %account_id,
            rewritten = changed.len().saturating_sub(1),
            "Installment updated, chain re-propagated"
        );

        Ok(CascadeOutcome {
            account_id,
            installment: chain.iter().find(|i| i.id == id).cloned(),
            rewritten: changed.len().saturating_sub(1),
            reconciliation_required,
        })
    }

    /// Delete an installment and re-chain its successors from the former
    /// predecessor.
    #[instrument(skip(self))]
    pub async fn delete_installment(&self, id: Uuid) -> Result<CascadeOutcome, LedgerError> {
        let existing = self
            .store
            .installment(id)
            .await?
            .ok_or(LedgerError::InstallmentNotFound(id))?;
        let account_id = existing.account_id;

        let lock = self.locks.for_account(account_id);
        let _guard = lock.lock().await;

        let mut chain = self.store.chain(account_id).await?;
        let idx = chain
            .iter()
            .position(|i| i.id == id)
            .ok_or(LedgerError::InstallmentNotFound(id))?;

        let account = self
            .store
            .account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;

        chain.remove(idx);
        let changed = recompute_from(&mut chain, idx, account.remaining_balance, &self.policy);
        self.store
            .rewrite_chain(account_id, &changed, Some(id))
            .await?;
        INSTALLMENTS_TOTAL.with_label_values(&["deleted"]).inc();

        let tail_balance = chain.last().map(|i| i.balance).unwrap_or(Decimal::ZERO);
        let reconciliation_required = tail_balance < -account.advance;
        if reconciliation_required {
            self.report_over_payment(&account, tail_balance).await?;
        }

        info!(
            installment_id = %id,
            account_id = %account_id,
            rewritten = changed.len(),
            "Installment deleted, successors re-chained"
        );

        Ok(CascadeOutcome {
            account_id,
            installment: None,
            rewritten: changed.len(),
            reconciliation_required,
        })
    }

    /// Ordered chain for an account, oldest first.
    pub async fn get_chain(&self, account_id: Uuid) -> Result<Vec<Installment>, LedgerError> {
        self.store
            .account(account_id)
            .await?
            .ok_or(LedgerError::AccountNotFound(account_id))?;
        self.store.chain(account_id).await
    }

    async fn report_over_payment(
        &self,
        account: &LeaseAccount,
        tail_balance: Decimal,
    ) -> Result<(), LedgerError> {
        warn!(
            account_id = %account.account_id,
            acc_no = %account.acc_no,
            tail_balance = %tail_balance,
            advance = %account.advance,
            "Chain tail over-paid beyond advance; reconciliation required"
        );
        self.store.flag_reconciliation(account.account_id).await
    }
}

fn apply_patch(node: &mut Installment, patch: &InstallmentPatch) {
    if let Some(v) = patch.install_date {
        node.install_date = v;
    }
    if let Some(v) = patch.install_charge {
        node.install_charge = v;
    }
    if let Some(v) = patch.fine {
        node.fine = v;
    }
    if let Some(v) = patch.fine_type {
        node.fine_type = v.as_str().to_string();
    }
    if let Some(v) = patch.discount {
        node.discount = v;
    }
    if let Some(v) = patch.payment_method {
        node.payment_method = v.as_str().to_string();
    }
    if let Some(v) = patch.bank_account_id {
        node.bank_account_id = Some(v);
    }
    if let Some(v) = patch.officer_id {
        node.officer_id = Some(v);
    }
    if let Some(v) = patch.sms_sent {
        node.sms_sent = v;
    }
    if let Some(v) = &patch.notes {
        node.notes = Some(v.clone());
    }
}

/// Recompute `chain[start..]` in place, seeding from the node before
/// `start` (or `seed_balance` when the cascade starts at the head).
/// Returns the rewritten nodes.
pub fn recompute_from(
    chain: &mut [Installment],
    start: usize,
    seed_balance: Decimal,
    policy: &FinePolicy,
) -> Vec<Installment> {
    let (mut pre, mut fines) = if start == 0 {
        (seed_balance, Decimal::ZERO)
    } else {
        let prev = &chain[start - 1];
        (prev.balance, prev.outstanding - prev.balance)
    };

    let mut changed = Vec::with_capacity(chain.len().saturating_sub(start));
    for node in chain.iter_mut().skip(start) {
        let fine_type = node.parsed_fine_type().unwrap_or(crate::models::FineType::Fixed);
        let out = balance::compute(
            pre,
            node.install_charge,
            node.fine,
            fine_type,
            node.discount,
            policy,
        );
        node.pre_balance = pre;
        node.balance = out.balance;
        fines += out.effective_fine;
        node.outstanding = if policy.include_fines_in_outstanding {
            node.balance + fines
        } else {
            node.balance
        };
        pre = node.balance;
        changed.push(node.clone());
    }
    changed
}
