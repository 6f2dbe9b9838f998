//! Installment ledger handlers.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{FineType, Installment, InstallmentPatch, PaymentMethod, PostInstallment};
use crate::startup::AppState;
use service_core::error::AppError;

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request to post a new installment.
#[derive(Debug, Deserialize)]
pub struct PostInstallmentRequest {
    pub install_date: NaiveDate,
    pub install_charge: Decimal,
    #[serde(default)]
    pub fine: Decimal,
    #[serde(default = "default_fine_type")]
    pub fine_type: FineType,
    #[serde(default)]
    pub discount: Decimal,
    pub payment_method: PaymentMethod,
    pub bank_account_id: Option<Uuid>,
    pub officer_id: Option<Uuid>,
    pub notes: Option<String>,
}

fn default_fine_type() -> FineType {
    FineType::Fixed
}

/// Request to update an existing installment. Absent fields are unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateInstallmentRequest {
    pub install_date: Option<NaiveDate>,
    pub install_charge: Option<Decimal>,
    pub fine: Option<Decimal>,
    pub fine_type: Option<FineType>,
    pub discount: Option<Decimal>,
    pub payment_method: Option<PaymentMethod>,
    pub bank_account_id: Option<Uuid>,
    pub officer_id: Option<Uuid>,
    pub sms_sent: Option<bool>,
    pub notes: Option<String>,
}

impl From<UpdateInstallmentRequest> for InstallmentPatch {
    fn from(req: UpdateInstallmentRequest) -> Self {
        Self {
            install_date: req.install_date,
            install_charge: req.install_charge,
            fine: req.fine,
            fine_type: req.fine_type,
            discount: req.discount,
            payment_method: req.payment_method,
            bank_account_id: req.bank_account_id,
            officer_id: req.officer_id,
            sms_sent: req.sms_sent,
            notes: req.notes,
        }
    }
}

/// Installment response.
#[derive(Debug, Serialize)]
pub struct InstallmentResponse {
    pub id: Uuid,
    pub account_id: Uuid,
    pub recv_no: i32,
    pub install_date: NaiveDate,
    pub pre_balance: Decimal,
    pub install_charge: Decimal,
    pub fine: Decimal,
    pub fine_type: String,
    pub discount: Decimal,
    pub balance: Decimal,
    pub outstanding: Decimal,
    pub payment_method: String,
    pub bank_account_id: Option<Uuid>,
    pub officer_id: Option<Uuid>,
    pub sms_sent: bool,
    pub notes: Option<String>,
    pub posted_utc: DateTime<Utc>,
}

impl From<Installment> for InstallmentResponse {
    fn from(i: Installment) -> Self {
        Self {
            id: i.id,
            account_id: i.account_id,
            recv_no: i.recv_no,
            install_date: i.install_date,
            pre_balance: i.pre_balance,
            install_charge: i.install_charge,
            fine: i.fine,
            fine_type: i.fine_type,
            discount: i.discount,
            balance: i.balance,
            outstanding: i.outstanding,
            payment_method: i.payment_method,
            bank_account_id: i.bank_account_id,
            officer_id: i.officer_id,
            sms_sent: i.sms_sent,
            notes: i.notes,
            posted_utc: i.posted_utc,
        }
    }
}

/// Update/delete response carrying cascade information.
#[derive(Debug, Serialize)]
pub struct CascadeResponse {
    pub account_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installment: Option<InstallmentResponse>,
    pub rewritten: usize,
    pub reconciliation_required: bool,
}

// ============================================================================
// Handlers
// ============================================================================

/// Post a new installment at the account's chain tail.
///
/// POST /accounts/:account_id/installments
pub async fn post_installment(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
    Json(req): Json<PostInstallmentRequest>,
) -> Result<(StatusCode, Json<InstallmentResponse>), AppError> {
    let input = PostInstallment {
        account_id,
        install_date: req.install_date,
        install_charge: req.install_charge,
        fine: req.fine,
        fine_type: req.fine_type,
        discount: req.discount,
        payment_method: req.payment_method,
        bank_account_id: req.bank_account_id,
        officer_id: req.officer_id,
        notes: req.notes,
    };

    let installment = state.ledger.post_installment(input).await?;
    state.refresh_after_mutation(account_id).await;

    Ok((StatusCode::CREATED, Json(installment.into())))
}

/// Get the ordered installment chain for an account.
///
/// GET /accounts/:account_id/installments
pub async fn get_chain(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> Result<Json<Vec<InstallmentResponse>>, AppError> {
    let chain = state.ledger.get_chain(account_id).await?;
    Ok(Json(chain.into_iter().map(Into::into).collect()))
}

/// Update an installment and re-propagate later postings.
///
/// PUT /installments/:id
pub async fn update_installment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateInstallmentRequest>,
) -> Result<Json<CascadeResponse>, AppError> {
    let outcome = state.ledger.update_installment(id, req.into()).await?;
    state.refresh_after_mutation(outcome.account_id).await;

    Ok(Json(CascadeResponse {
        account_id: outcome.account_id,
        installment: outcome.installment.map(Into::into),
        rewritten: outcome.rewritten,
        reconciliation_required: outcome.reconciliation_required,
    }))
}

/// Delete an installment and re-chain its successors.
///
/// DELETE /installments/:id
pub async fn delete_installment(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CascadeResponse>, AppError> {
    let outcome = state.ledger.delete_installment(id).await?;
    state.refresh_after_mutation(outcome.account_id).await;

    Ok(Json(CascadeResponse {
        account_id: outcome.account_id,
        installment: None,
        rewritten: outcome.rewritten,
        reconciliation_required: outcome.reconciliation_required,
    }))
}
