//! Postgres store for installment-service.

use std::time::Duration;

use async_trait::async_trait;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::models::{
    AccountFilter, Installment, LeaseAccount, OutstandingRecord,
};
use crate::services::metrics::DB_QUERY_DURATION;
use crate::services::{LedgerError, LedgerStore};

const INSTALLMENT_COLUMNS: &str = "id, account_id, recv_no, install_date, pre_balance, \
     install_charge, fine, fine_type, discount, balance, outstanding, payment_method, \
     bank_account_id, officer_id, sms_sent, notes, posted_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "installment-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }
}

fn db_err(context: &str, e: sqlx::Error) -> LedgerError {
    LedgerError::Storage(anyhow::anyhow!("{}: {}", context, e))
}

#[async_trait]
impl LedgerStore for Database {
    #[instrument(skip(self))]
    async fn ping(&self) -> Result<(), LedgerError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| db_err("Health check failed", e))?;
        Ok(())
    }

    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn account(&self, account_id: Uuid) -> Result<Option<LeaseAccount>, LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["account"])
            .start_timer();

        let account = sqlx::query_as::<_, LeaseAccount>(
            r#"
            SELECT account_id, acc_no, process_type, installment_price, advance,
                   monthly_installment, duration, remaining_balance, created_utc
            FROM lease_accounts
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("Failed to get lease account", e))?;

        timer.observe_duration();

        Ok(account)
    }

    #[instrument(skip(self, filter))]
    async fn account_ids(&self, filter: &AccountFilter) -> Result<Vec<Uuid>, LedgerError> {
        // Explicit ids are taken verbatim; unknown accounts surface as
        // per-account failures in the batch summary.
        if let Some(ids) = &filter.account_ids {
            return Ok(ids.clone());
        }

        let timer = DB_QUERY_DURATION
            .with_label_values(&["account_ids"])
            .start_timer();

        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT account_id
            FROM lease_accounts
            WHERE ($1::varchar IS NULL OR process_type = $1)
            ORDER BY account_id
            "#,
        )
        .bind(filter.process_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("Failed to list lease accounts", e))?;

        timer.observe_duration();

        Ok(ids)
    }

    #[instrument(skip(self), fields(bank_account_id = %bank_account_id))]
    async fn bank_account_active(&self, bank_account_id: Uuid) -> Result<bool, LedgerError> {
        let active: Option<bool> = sqlx::query_scalar(
            "SELECT active FROM bank_accounts WHERE bank_account_id = $1",
        )
        .bind(bank_account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("Failed to check bank account", e))?;

        Ok(active.unwrap_or(false))
    }

    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn chain(&self, account_id: Uuid) -> Result<Vec<Installment>, LedgerError> {
        let timer = DB_QUERY_DURATION.with_label_values(&["chain"]).start_timer();

        let chain = sqlx::query_as::<_, Installment>(&format!(
            "SELECT {INSTALLMENT_COLUMNS} FROM installments \
             WHERE account_id = $1 ORDER BY install_date, id"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_err("Failed to load installment chain", e))?;

        timer.observe_duration();

        Ok(chain)
    }

    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn chain_tail(&self, account_id: Uuid) -> Result<Option<Installment>, LedgerError> {
        let tail = sqlx::query_as::<_, Installment>(&format!(
            "SELECT {INSTALLMENT_COLUMNS} FROM installments \
             WHERE account_id = $1 ORDER BY install_date DESC, id DESC LIMIT 1"
        ))
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("Failed to load chain tail", e))?;

        Ok(tail)
    }

    #[instrument(skip(self), fields(id = %id))]
    async fn installment(&self, id: Uuid) -> Result<Option<Installment>, LedgerError> {
        let row = sqlx::query_as::<_, Installment>(&format!(
            "SELECT {INSTALLMENT_COLUMNS} FROM installments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("Failed to get installment", e))?;

        Ok(row)
    }

    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn next_recv_no(&self, account_id: Uuid) -> Result<i32, LedgerError> {
        let max: Option<i32> = sqlx::query_scalar(
            "SELECT MAX(recv_no) FROM installments WHERE account_id = $1",
        )
        .bind(account_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| db_err("Failed to resolve receipt number", e))?;

        Ok(max.unwrap_or(0) + 1)
    }

    #[instrument(skip(self, row), fields(account_id = %row.account_id, recv_no = row.recv_no))]
    async fn insert_installment(&self, row: &Installment) -> Result<(), LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_installment"])
            .start_timer();

        sqlx::query(&format!(
            "INSERT INTO installments ({INSTALLMENT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)"
        ))
        .bind(row.id)
        .bind(row.account_id)
        .bind(row.recv_no)
        .bind(row.install_date)
        .bind(row.pre_balance)
        .bind(row.install_charge)
        .bind(row.fine)
        .bind(&row.fine_type)
        .bind(row.discount)
        .bind(row.balance)
        .bind(row.outstanding)
        .bind(&row.payment_method)
        .bind(row.bank_account_id)
        .bind(row.officer_id)
        .bind(row.sms_sent)
        .bind(&row.notes)
        .bind(row.posted_utc)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => LedgerError::Storage(
                anyhow::anyhow!("Duplicate receipt number {} for account", row.recv_no),
            ),
            _ => db_err("Failed to insert installment", e),
        })?;

        timer.observe_duration();

        Ok(())
    }

    /// The whole cascade commits or none of it does, so a crash mid-rewrite
    /// cannot leave mismatched `pre_balance`/`balance` pairs.
    #[instrument(skip(self, upserts), fields(account_id = %account_id, upserts = upserts.len()))]
    async fn rewrite_chain(
        &self,
        account_id: Uuid,
        upserts: &[Installment],
        delete: Option<Uuid>,
    ) -> Result<(), LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["rewrite_chain"])
            .start_timer();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_err("Failed to begin transaction", e))?;

        if let Some(id) = delete {
            sqlx::query("DELETE FROM installments WHERE id = $1 AND account_id = $2")
                .bind(id)
                .bind(account_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| db_err("Failed to delete installment", e))?;
        }

        for row in upserts {
            sqlx::query(
                r#"
                UPDATE installments
                SET install_date = $2, pre_balance = $3, install_charge = $4, fine = $5,
                    fine_type = $6, discount = $7, balance = $8, outstanding = $9,
                    payment_method = $10, bank_account_id = $11, officer_id = $12,
                    sms_sent = $13, notes = $14
                WHERE id = $1
                "#,
            )
            .bind(row.id)
            .bind(row.install_date)
            .bind(row.pre_balance)
            .bind(row.install_charge)
            .bind(row.fine)
            .bind(&row.fine_type)
            .bind(row.discount)
            .bind(row.balance)
            .bind(row.outstanding)
            .bind(&row.payment_method)
            .bind(row.bank_account_id)
            .bind(row.officer_id)
            .bind(row.sms_sent)
            .bind(&row.notes)
            .execute(&mut *tx)
            .await
            .map_err(|e| db_err("Failed to rewrite installment", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_err("Failed to commit chain rewrite", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn outstanding(
        &self,
        account_id: Uuid,
    ) -> Result<Option<OutstandingRecord>, LedgerError> {
        let record = sqlx::query_as::<_, OutstandingRecord>(
            r#"
            SELECT account_id, outstanding_amount, pending_installments, last_payment_date,
                   recovery_officer_id, status, reconciliation_required
            FROM outstanding_records
            WHERE account_id = $1
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("Failed to get outstanding record", e))?;

        Ok(record)
    }

    #[instrument(skip(self, record), fields(account_id = %record.account_id))]
    async fn replace_outstanding(&self, record: &OutstandingRecord) -> Result<(), LedgerError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["replace_outstanding"])
            .start_timer();

        sqlx::query(
            r#"
            INSERT INTO outstanding_records
                (account_id, outstanding_amount, pending_installments, last_payment_date,
                 recovery_officer_id, status, reconciliation_required)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (account_id) DO UPDATE
            SET outstanding_amount = EXCLUDED.outstanding_amount,
                pending_installments = EXCLUDED.pending_installments,
                last_payment_date = EXCLUDED.last_payment_date,
                recovery_officer_id = EXCLUDED.recovery_officer_id,
                status = EXCLUDED.status,
                reconciliation_required = EXCLUDED.reconciliation_required
            "#,
        )
        .bind(record.account_id)
        .bind(record.outstanding_amount)
        .bind(record.pending_installments)
        .bind(record.last_payment_date)
        .bind(record.recovery_officer_id)
        .bind(&record.status)
        .bind(record.reconciliation_required)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("Failed to replace outstanding record", e))?;

        timer.observe_duration();

        Ok(())
    }

    #[instrument(skip(self), fields(account_id = %account_id, officer_id = %officer_id))]
    async fn assign_recovery_officer(
        &self,
        account_id: Uuid,
        officer_id: Uuid,
    ) -> Result<bool, LedgerError> {
        let result = sqlx::query(
            "UPDATE outstanding_records SET recovery_officer_id = $1 WHERE account_id = $2",
        )
        .bind(officer_id)
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("Failed to assign recovery officer", e))?;

        Ok(result.rows_affected() > 0)
    }

    /// The settle guard lives in the WHERE clause: a writer that slips past
    /// the in-process locks still cannot clear a record that owes money.
    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn clear_if_settled(
        &self,
        account_id: Uuid,
    ) -> Result<Option<OutstandingRecord>, LedgerError> {
        let record = sqlx::query_as::<_, OutstandingRecord>(
            r#"
            UPDATE outstanding_records
            SET status = 'cleared'
            WHERE account_id = $1 AND outstanding_amount <= 0
            RETURNING account_id, outstanding_amount, pending_installments, last_payment_date,
                      recovery_officer_id, status, reconciliation_required
            "#,
        )
        .bind(account_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_err("Failed to clear outstanding record", e))?;

        Ok(record)
    }

    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn flag_reconciliation(&self, account_id: Uuid) -> Result<(), LedgerError> {
        sqlx::query(
            "UPDATE outstanding_records SET reconciliation_required = TRUE WHERE account_id = $1",
        )
        .bind(account_id)
        .execute(&self.pool)
        .await
        .map_err(|e| db_err("Failed to flag reconciliation", e))?;

        Ok(())
    }
}
