//! In-memory store, used by the test suites and for local development
//! without a Postgres instance. Mutations take the single write lock, which
//! makes multi-row chain rewrites atomic the same way the Postgres store's
//! transactions do.

use std::collections::HashMap;

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{
    AccountFilter, Installment, LeaseAccount, OutstandingRecord, OutstandingStatus,
};
use crate::services::{LedgerError, LedgerStore};

#[derive(Default)]
struct Inner {
    accounts: HashMap<Uuid, LeaseAccount>,
    /// bank_account_id -> active
    bank_accounts: HashMap<Uuid, bool>,
    installments: HashMap<Uuid, Installment>,
    outstanding: HashMap<Uuid, OutstandingRecord>,
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a lease account (normally owned by the external CRUD surface).
    pub async fn insert_account(&self, account: LeaseAccount) {
        self.inner
            .write()
            .await
            .accounts
            .insert(account.account_id, account);
    }

    /// Seed a bank account known to the external collaborator.
    pub async fn insert_bank_account(&self, bank_account_id: Uuid, active: bool) {
        self.inner
            .write()
            .await
            .bank_accounts
            .insert(bank_account_id, active);
    }
}

fn sorted_chain(inner: &Inner, account_id: Uuid) -> Vec<Installment> {
    let mut chain: Vec<Installment> = inner
        .installments
        .values()
        .filter(|i| i.account_id == account_id)
        .cloned()
        .collect();
    chain.sort_by(|a, b| (a.install_date, a.id).cmp(&(b.install_date, b.id)));
    chain
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn ping(&self) -> Result<(), LedgerError> {
        Ok(())
    }

    async fn account(&self, account_id: Uuid) -> Result<Option<LeaseAccount>, LedgerError> {
        Ok(self.inner.read().await.accounts.get(&account_id).cloned())
    }

    async fn account_ids(&self, filter: &AccountFilter) -> Result<Vec<Uuid>, LedgerError> {
        // Explicit ids are taken verbatim; unknown accounts surface as
        // per-account failures in the batch summary.
        if let Some(ids) = &filter.account_ids {
            return Ok(ids.clone());
        }
        let inner = self.inner.read().await;
        let mut ids: Vec<Uuid> = inner
            .accounts
            .values()
            .filter(|a| match filter.process_type {
                Some(pt) => a.process_type == pt.as_str(),
                None => true,
            })
            .map(|a| a.account_id)
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn bank_account_active(&self, bank_account_id: Uuid) -> Result<bool, LedgerError> {
        Ok(self
            .inner
            .read()
            .await
            .bank_accounts
            .get(&bank_account_id)
            .copied()
            .unwrap_or(false))
    }

    async fn chain(&self, account_id: Uuid) -> Result<Vec<Installment>, LedgerError> {
        Ok(sorted_chain(&*self.inner.read().await, account_id))
    }

    async fn chain_tail(&self, account_id: Uuid) -> Result<Option<Installment>, LedgerError> {
        Ok(sorted_chain(&*self.inner.read().await, account_id)
            .into_iter()
            .last())
    }

    async fn installment(&self, id: Uuid) -> Result<Option<Installment>, LedgerError> {
        Ok(self.inner.read().await.installments.get(&id).cloned())
    }

    async fn next_recv_no(&self, account_id: Uuid) -> Result<i32, LedgerError> {
        let inner = self.inner.read().await;
        let max = inner
            .installments
            .values()
            .filter(|i| i.account_id == account_id)
            .map(|i| i.recv_no)
            .max()
            .unwrap_or(0);
        Ok(max + 1)
    }

    async fn insert_installment(&self, row: &Installment) -> Result<(), LedgerError> {
        self.inner
            .write()
            .await
            .installments
            .insert(row.id, row.clone());
        Ok(())
    }

    async fn rewrite_chain(
        &self,
        _account_id: Uuid,
        upserts: &[Installment],
        delete: Option<Uuid>,
    ) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().await;
        if let Some(id) = delete {
            inner.installments.remove(&id);
        }
        for row in upserts {
            inner.installments.insert(row.id, row.clone());
        }
        Ok(())
    }

    async fn outstanding(
        &self,
        account_id: Uuid,
    ) -> Result<Option<OutstandingRecord>, LedgerError> {
        Ok(self.inner.read().await.outstanding.get(&account_id).cloned())
    }

    async fn replace_outstanding(&self, record: &OutstandingRecord) -> Result<(), LedgerError> {
        self.inner
            .write()
            .await
            .outstanding
            .insert(record.account_id, record.clone());
        Ok(())
    }

    async fn assign_recovery_officer(
        &self,
        account_id: Uuid,
        officer_id: Uuid,
    ) -> Result<bool, LedgerError> {
        let mut inner = self.inner.write().await;
        match inner.outstanding.get_mut(&account_id) {
            Some(rec) => {
                rec.recovery_officer_id = Some(officer_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear_if_settled(
        &self,
        account_id: Uuid,
    ) -> Result<Option<OutstandingRecord>, LedgerError> {
        let mut inner = self.inner.write().await;
        match inner.outstanding.get_mut(&account_id) {
            Some(rec) if rec.outstanding_amount <= Decimal::ZERO => {
                rec.status = OutstandingStatus::Cleared.as_str().to_string();
                Ok(Some(rec.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn flag_reconciliation(&self, account_id: Uuid) -> Result<(), LedgerError> {
        let mut inner = self.inner.write().await;
        if let Some(rec) = inner.outstanding.get_mut(&account_id) {
            rec.reconciliation_required = true;
        }
        Ok(())
    }
}
