//! Outstanding snapshot and recovery assignment handlers.

use axum::extract::{Json, Path, State};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::models::{AccountFilter, OutstandingRecord, ProcessType, RefreshSummary};
use crate::startup::AppState;
use service_core::error::AppError;

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request to run a batch outstanding refresh.
#[derive(Debug, Default, Deserialize)]
pub struct RefreshAllRequest {
    pub process_type: Option<ProcessType>,
    pub account_ids: Option<Vec<Uuid>>,
}

/// Request to bulk-assign a recovery officer.
#[derive(Debug, Deserialize)]
pub struct AssignOfficerRequest {
    pub account_ids: Vec<Uuid>,
    pub officer_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct AssignOfficerResponse {
    pub updated: u64,
}

/// Outstanding snapshot response.
#[derive(Debug, Serialize)]
pub struct OutstandingResponse {
    pub account_id: Uuid,
    pub outstanding_amount: Decimal,
    pub pending_installments: i32,
    pub last_payment_date: Option<NaiveDate>,
    pub recovery_officer_id: Option<Uuid>,
    pub status: String,
    pub reconciliation_required: bool,
}

impl From<OutstandingRecord> for OutstandingResponse {
    fn from(r: OutstandingRecord) -> Self {
        Self {
            account_id: r.account_id,
            outstanding_amount: r.outstanding_amount,
            pending_installments: r.pending_installments,
            last_payment_date: r.last_payment_date,
            recovery_officer_id: r.recovery_officer_id,
            status: r.status,
            reconciliation_required: r.reconciliation_required,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Read an account's outstanding snapshot.
///
/// GET /accounts/:account_id/outstanding
pub async fn get_outstanding(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<OutstandingResponse>, AppError> {
    let record = state
        .store
        .outstanding(account_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("No outstanding record for account")))?;
    Ok(Json(record.into()))
}

/// Rebuild one account's snapshot from its ledger.
///
/// POST /accounts/:account_id/outstanding/refresh
pub async fn refresh_one(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<OutstandingResponse>, AppError> {
    let record = state.aggregator.refresh_one(account_id).await?;
    Ok(Json(record.into()))
}

/// Run a batch refresh over matching accounts.
///
/// POST /outstanding/refresh
pub async fn refresh_all(
    State(state): State<AppState>,
    Json(req): Json<RefreshAllRequest>,
) -> Result<Json<RefreshSummary>, AppError> {
    let filter = AccountFilter {
        process_type: req.process_type,
        account_ids: req.account_ids,
    };
    // HTTP-triggered runs are not cancellable; scheduled jobs pass their own
    // token through the aggregator directly.
    let summary = state
        .aggregator
        .refresh_all(&filter, &CancellationToken::new())
        .await?;
    Ok(Json(summary))
}

/// Bulk-assign a recovery officer to outstanding records.
///
/// POST /outstanding/assign
pub async fn assign_officer(
    State(state): State<AppState>,
    Json(req): Json<AssignOfficerRequest>,
) -> Result<Json<AssignOfficerResponse>, AppError> {
    let updated = state
        .coordinator
        .assign_officer(&req.account_ids, req.officer_id)
        .await?;
    Ok(Json(AssignOfficerResponse { updated }))
}

/// Clear a settled account's snapshot.
///
/// POST /accounts/:account_id/outstanding/clear
pub async fn clear_outstanding(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<OutstandingResponse>, AppError> {
    let record = state.coordinator.clear_outstanding(account_id).await?;
    Ok(Json(record.into()))
}
