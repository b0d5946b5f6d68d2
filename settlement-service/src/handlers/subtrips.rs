//! HTTP handlers for the subtrip lifecycle, expenses and the audit trail.

use crate::dtos::{
    AddExpenseRequest, CreateSubtripRequest, EventRangeParams, EventResponse, ListResponse,
    ResolveErrorRequest, SubtripListParams, UpdateSubtripRequest,
};
use crate::middleware::TenantContext;
use crate::models::{CreateSubtrip, ListSubtripsFilter, ReceiveInfo, SubtripStatus};
use crate::startup::AppState;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

pub async fn create_subtrip(
    State(state): State<AppState>,
    tenant: TenantContext,
    Json(request): Json<CreateSubtripRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;

    let input = CreateSubtrip {
        tenant_id: tenant.tenant_id,
        customer_id: request.customer_id,
        vehicle_id: request.vehicle_id,
        driver_id: request.driver_id,
        route_id: request.route_id,
        loading_point: request.loading_point,
        unloading_point: request.unloading_point,
        start_date: request.start_date,
        is_empty: request.is_empty,
        remarks: request.remarks,
        material: request.material,
    };

    let subtrip = state.db.create_subtrip(&input, tenant.user_id).await?;
    Ok((StatusCode::CREATED, Json(subtrip)))
}

pub async fn list_subtrips(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(params): Query<SubtripListParams>,
) -> Result<impl IntoResponse, AppError> {
    let filter = ListSubtripsFilter {
        status: params.status.as_deref().map(SubtripStatus::from_string),
        customer_id: params.customer_id,
        vehicle_id: params.vehicle_id,
        driver_id: params.driver_id,
        start_date: params.start_date,
        end_date: params.end_date,
        page_size: params.page_size,
        page_token: params.page_token,
    };

    let subtrips = state.db.list_subtrips(tenant.tenant_id, &filter).await?;
    Ok(Json(ListResponse::new(subtrips, params.page_size, |s| {
        s.subtrip_id
    })))
}

pub async fn get_subtrip(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(subtrip_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let subtrip = state
        .db
        .get_subtrip(tenant.tenant_id, subtrip_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("subtrip {} not found", subtrip_id)))?;
    Ok(Json(subtrip))
}

pub async fn add_material_info(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(subtrip_id): Path<Uuid>,
    Json(material): Json<crate::models::MaterialInfo>,
) -> Result<impl IntoResponse, AppError> {
    let subtrip = state
        .db
        .add_material_info(tenant.tenant_id, subtrip_id, &material, tenant.user_id)
        .await?;
    Ok(Json(subtrip))
}

pub async fn receive_subtrip(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(subtrip_id): Path<Uuid>,
    Json(receipt): Json<ReceiveInfo>,
) -> Result<impl IntoResponse, AppError> {
    let subtrip = state
        .db
        .receive_subtrip(tenant.tenant_id, subtrip_id, &receipt, tenant.user_id)
        .await?;
    Ok(Json(subtrip))
}

pub async fn resolve_error(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(subtrip_id): Path<Uuid>,
    Json(request): Json<ResolveErrorRequest>,
) -> Result<impl IntoResponse, AppError> {
    request.validate()?;
    let subtrip = state
        .db
        .resolve_error(tenant.tenant_id, subtrip_id, &request.remarks, tenant.user_id)
        .await?;
    Ok(Json(subtrip))
}

pub async fn update_subtrip(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(subtrip_id): Path<Uuid>,
    Json(patch): Json<UpdateSubtripRequest>,
) -> Result<impl IntoResponse, AppError> {
    let subtrip = state
        .db
        .update_subtrip(tenant.tenant_id, subtrip_id, &patch, tenant.user_id)
        .await?;
    Ok(Json(subtrip))
}

pub async fn close_subtrip(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(subtrip_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let subtrip = state
        .db
        .close_subtrip(tenant.tenant_id, subtrip_id, tenant.user_id)
        .await?;
    Ok(Json(subtrip))
}

pub async fn delete_subtrip(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(subtrip_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = state.db.delete_subtrip(tenant.tenant_id, subtrip_id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "subtrip {} not found",
            subtrip_id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_expense(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(subtrip_id): Path<Uuid>,
    Json(request): Json<AddExpenseRequest>,
) -> Result<impl IntoResponse, AppError> {
    let expense = state
        .db
        .add_expense(
            tenant.tenant_id,
            subtrip_id,
            request.expense_type,
            request.amount,
            request.remarks,
            tenant.user_id,
        )
        .await?;
    Ok((StatusCode::CREATED, Json(expense)))
}

pub async fn list_expenses(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(subtrip_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let expenses = state.db.list_expenses(tenant.tenant_id, subtrip_id).await?;
    Ok(Json(expenses))
}

pub async fn delete_expense(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path((subtrip_id, expense_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, AppError> {
    let deleted = state
        .db
        .delete_expense(tenant.tenant_id, subtrip_id, expense_id, tenant.user_id)
        .await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "expense {} not found",
            expense_id
        )));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_subtrip_events(
    State(state): State<AppState>,
    tenant: TenantContext,
    Path(subtrip_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let events = state
        .db
        .list_subtrip_events(tenant.tenant_id, subtrip_id)
        .await?;
    let events: Vec<EventResponse> = events.into_iter().map(EventResponse::from).collect();
    Ok(Json(events))
}

pub async fn list_events_by_range(
    State(state): State<AppState>,
    tenant: TenantContext,
    Query(params): Query<EventRangeParams>,
) -> Result<impl IntoResponse, AppError> {
    if params.end_date < params.start_date {
        return Err(AppError::ValidationError(anyhow::anyhow!(
            "end_date must not precede start_date"
        )));
    }
    let events = state
        .db
        .list_events_by_range(tenant.tenant_id, params.start_date, params.end_date)
        .await?;
    let events: Vec<EventResponse> = events.into_iter().map(EventResponse::from).collect();
    Ok(Json(events))
}
