//! Tenant context middleware for multi-tenancy support.
//!
//! Extracts the tenant and acting user from request headers. These headers
//! are set by the gateway after authenticating the request; every query in
//! this service is scoped by the extracted tenant ID.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

/// Tenant context extracted from request headers.
#[derive(Debug, Clone, Copy)]
pub struct TenantContext {
    pub tenant_id: Uuid,
    /// User performing the request, recorded on audit events.
    pub user_id: Option<Uuid>,
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let tenant_id = parts
            .headers
            .get("X-Tenant-ID")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!(
                    "Missing X-Tenant-ID header (required from gateway)"
                ))
            })?;
        let tenant_id = Uuid::parse_str(tenant_id).map_err(|_| {
            AppError::BadRequest(anyhow::anyhow!("X-Tenant-ID must be a valid UUID"))
        })?;

        let user_id = parts
            .headers
            .get("X-User-ID")
            .and_then(|v| v.to_str().ok())
            .map(Uuid::parse_str)
            .transpose()
            .map_err(|_| {
                AppError::BadRequest(anyhow::anyhow!("X-User-ID must be a valid UUID"))
            })?;

        let span = tracing::Span::current();
        span.record("tenant_id", tenant_id.to_string());
        if let Some(user_id) = user_id {
            span.record("user_id", user_id.to_string());
        }

        Ok(TenantContext { tenant_id, user_id })
    }
}
