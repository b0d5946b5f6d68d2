//! HTTP handlers for customer invoices and their payments.

use crate::dtos::{
    BulkCreateInvoicesRequest, CreateInvoiceRequest, ListResponse, MarkOverdueRequest,
    MarkOverdueResponse, RecordPaymentRequest, SettlementListParams,
};
use crate::middleware::TenantContext;
use crate::models::{CreateInvoice, ListSettlementsFilter};
use crate::startup::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use serde_json::json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

fn to_input(tenant_id: Uuid, request: CreateInvoiceRequest) -> CreateInvoice {
    CreateInvoice {
        tenant_id,
        customer_id: request.customer_id,
        subtrip_ids: request.subtrip_ids,
        additional_charges: request.additional_charges,
        issue_date: request
            .issue_date
            .unwrap_or_else(|| Utc::now().date_naive()),
    }
}

pub async fn create_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<CreateInvoiceRequest>,
) -> Result<impl IntoResponse, AppError> {
    let input = to_input(tenant.tenant_id, request);
    let invoice = state
        .db
        .create_invoice(&input, state.config.default_gst_rate, tenant.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn create_invoices_bulk(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<BulkCreateInvoicesRequest>,
) -> Result<impl IntoResponse, AppError> {
    if request.invoices.is_empty() {
        return Err(AppError::ValidationError(anyhow::anyhow!(
            "at least one invoice is required"
        )));
    }
    let inputs: Vec<CreateInvoice> = request
        .invoices
        .into_iter()
        .map(|r| to_input(tenant.tenant_id, r))
        .collect();
    let invoices = state
        .db
        .create_invoices_bulk(&inputs, state.config.default_gst_rate, tenant.user_id)
        .await?;
    Ok((StatusCode::CREATED, Json(invoices)))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(params): Query<SettlementListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filter = ListSettlementsFilter {
        status: params.status,
        counterparty_id: params.counterparty_id,
        start_date: params.start_date,
        end_date: params.end_date,
        page_size: params.page_size,
        page_token: params.page_token,
    };
    let invoices = state.db.list_invoices(tenant.tenant_id, &filter).await?;
    Ok(Json(ListResponse::new(invoices, params.page_size, |i| {
        i.invoice_id
    })))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state
        .db
        .get_invoice(tenant.tenant_id, invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("invoice {} not found", invoice_id)))?;
    Ok(Json(invoice))
}

pub async fn cancel_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let invoice = state
        .db
        .cancel_invoice(tenant.tenant_id, invoice_id, tenant.user_id)
        .await?;
    Ok(Json(invoice))
}

pub async fn delete_invoice(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = state
        .db
        .delete_invoice(tenant.tenant_id, invoice_id, tenant.user_id)
        .await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "invoice {} not found",
            invoice_id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn record_payment(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    let payment_date = request
        .payment_date
        .unwrap_or_else(|| Utc::now().date_naive());
    let (invoice, payment) = state
        .db
        .record_payment(
            tenant.tenant_id,
            invoice_id,
            request.amount,
            payment_date,
            &request.payment_mode,
            request.payment_reference,
            tenant.user_id,
        )
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({ "invoice": invoice, "payment": payment })),
    ))
}

pub async fn list_payments(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(invoice_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let payments = state
        .db
        .list_invoice_payments(tenant.tenant_id, invoice_id)
        .await?;
    Ok(Json(payments))
}

pub async fn mark_overdue(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<MarkOverdueRequest>,
) -> Result<impl IntoResponse, AppError> {
    let as_of = request.as_of.unwrap_or_else(|| Utc::now().date_naive());
    let marked = state.db.mark_overdue_invoices(tenant.tenant_id, as_of).await?;
    Ok(Json(MarkOverdueResponse { marked }))
}
