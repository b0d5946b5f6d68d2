//! HTTP handlers for payout receipts: driver salaries and transporter
//! payments. Both route groups delegate to the shared payout engine with
//! their own `PayoutKind`.

use crate::dtos::{
    BulkCreateDriverSalariesRequest, BulkCreateTransporterPaymentsRequest,
    CreateDriverSalaryRequest, CreateTransporterPaymentRequest, ListResponse, MarkPaidRequest,
    SettlementListParams,
};
use crate::middleware::TenantContext;
use crate::models::{CreatePayout, ListSettlementsFilter};
use crate::services::PayoutKind;
use crate::startup::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

async fn create_one(
    state: &AppState,
    tenant: TenantContext,
    kind: PayoutKind,
    input: CreatePayout,
) -> Result<impl IntoResponse, AppError> {
    let receipt = state
        .db
        .create_payout(kind, &input, state.config.default_gst_rate, tenant.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn create_bulk(
    state: &AppState,
    tenant: TenantContext,
    kind: PayoutKind,
    inputs: Vec<CreatePayout>,
) -> Result<impl IntoResponse, AppError> {
    if inputs.is_empty() {
        return Err(AppError::ValidationError(anyhow::anyhow!(
            "at least one receipt is required"
        )));
    }
    let receipts = state
        .db
        .create_payouts_bulk(kind, &inputs, state.config.default_gst_rate, tenant.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(receipts)))
}

async fn list(
    state: &AppState,
    tenant: TenantContext,
    kind: PayoutKind,
    params: SettlementListParams,
) -> Result<impl IntoResponse, AppError> {
    let filter = ListSettlementsFilter {
        status: params.status,
        counterparty_id: params.counterparty_id,
        start_date: params.start_date,
        end_date: params.end_date,
        page_size: params.page_size,
        page_token: params.page_token,
    };
    let receipts = state.db.list_payouts(kind, tenant.tenant_id, &filter).await?;
    Ok(Json(ListResponse::new(receipts, params.page_size, |r| {
        r.receipt_id
    })))
}

async fn get_one(
    state: &AppState,
    tenant: TenantContext,
    kind: PayoutKind,
    receipt_id: Uuid,
) -> Result<impl IntoResponse, AppError> {
    let receipt = state
        .db
        .get_payout(kind, tenant.tenant_id, receipt_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("receipt {} not found", receipt_id)))?;
    Ok(Json(receipt))
}

async fn mark_paid(
    state: &AppState,
    tenant: TenantContext,
    kind: PayoutKind,
    receipt_id: Uuid,
    request: MarkPaidRequest,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    let paid_date = request.paid_date.unwrap_or_else(|| Utc::now().date_naive());
    let receipt = state
        .db
        .mark_payout_paid(
            kind,
            tenant.tenant_id,
            receipt_id,
            paid_date,
            &request.payment_mode,
        )
        .await?;
    Ok(Json(receipt))
}

async fn cancel(
    state: &AppState,
    tenant: TenantContext,
    kind: PayoutKind,
    receipt_id: Uuid,
) -> Result<impl IntoResponse, AppError> {
    let receipt = state
        .db
        .cancel_payout(kind, tenant.tenant_id, receipt_id, tenant.user_id)
        .await?;
    Ok(Json(receipt))
}

async fn delete(
    state: &AppState,
    tenant: TenantContext,
    kind: PayoutKind,
    receipt_id: Uuid,
) -> Result<impl IntoResponse, AppError> {
    let deleted = state
        .db
        .delete_payout(kind, tenant.tenant_id, receipt_id, tenant.user_id)
        .await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "receipt {} not found",
            receipt_id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

// --- Driver salaries ---------------------------------------------------------

pub async fn create_driver_salary(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<CreateDriverSalaryRequest>,
) -> Result<impl IntoResponse, AppError> {
    let input = CreatePayout {
        tenant_id: tenant.tenant_id,
        counterparty_id: request.driver_id,
        subtrip_ids: request.subtrip_ids,
        additional_charges: request.additional_charges,
    };
    create_one(&state, tenant, PayoutKind::DriverSalary, input).await
}

pub async fn create_driver_salaries_bulk(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<BulkCreateDriverSalariesRequest>,
) -> Result<impl IntoResponse, AppError> {
    let inputs = request
        .receipts
        .into_iter()
        .map(|r| CreatePayout {
            tenant_id: tenant.tenant_id,
            counterparty_id: r.driver_id,
            subtrip_ids: r.subtrip_ids,
            additional_charges: r.additional_charges,
        })
        .collect();
    create_bulk(&state, tenant, PayoutKind::DriverSalary, inputs).await
}

pub async fn list_driver_salaries(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(params): Query<SettlementListParams>,
) -> Result<impl IntoResponse, AppError> {
    list(&state, tenant, PayoutKind::DriverSalary, params).await
}

pub async fn get_driver_salary(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(receipt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    get_one(&state, tenant, PayoutKind::DriverSalary, receipt_id).await
}

pub async fn mark_driver_salary_paid(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(receipt_id): Path<Uuid>,
    Json(request): Json<MarkPaidRequest>,
) -> Result<impl IntoResponse, AppError> {
    mark_paid(&state, tenant, PayoutKind::DriverSalary, receipt_id, request).await
}

pub async fn cancel_driver_salary(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(receipt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    cancel(&state, tenant, PayoutKind::DriverSalary, receipt_id).await
}

pub async fn delete_driver_salary(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(receipt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    delete(&state, tenant, PayoutKind::DriverSalary, receipt_id).await
}

// --- Transporter payments ----------------------------------------------------

pub async fn create_transporter_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<CreateTransporterPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    let input = CreatePayout {
        tenant_id: tenant.tenant_id,
        counterparty_id: request.transporter_id,
        subtrip_ids: request.subtrip_ids,
        additional_charges: request.additional_charges,
    };
    create_one(&state, tenant, PayoutKind::TransporterPayment, input).await
}

pub async fn create_transporter_payments_bulk(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<BulkCreateTransporterPaymentsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let inputs = request
        .receipts
        .into_iter()
        .map(|r| CreatePayout {
            tenant_id: tenant.tenant_id,
            counterparty_id: r.transporter_id,
            subtrip_ids: r.subtrip_ids,
            additional_charges: r.additional_charges,
        })
        .collect();
    create_bulk(&state, tenant, PayoutKind::TransporterPayment, inputs).await
}

pub async fn list_transporter_payments(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(params): Query<SettlementListParams>,
) -> Result<impl IntoResponse, AppError> {
    list(&state, tenant, PayoutKind::TransporterPayment, params).await
}

pub async fn get_transporter_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(receipt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    get_one(&state, tenant, PayoutKind::TransporterPayment, receipt_id).await
}

pub async fn mark_transporter_payment_paid(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(receipt_id): Path<Uuid>,
    Json(request): Json<MarkPaidRequest>,
) -> Result<impl IntoResponse, AppError> {
    mark_paid(
        &state,
        tenant,
        PayoutKind::TransporterPayment,
        receipt_id,
        request,
    )
    .await
}

pub async fn cancel_transporter_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(receipt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    cancel(&state, tenant, PayoutKind::TransporterPayment, receipt_id).await
}

pub async fn delete_transporter_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(receipt_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    delete(&state, tenant, PayoutKind::TransporterPayment, receipt_id).await
}
