//! Application startup and lifecycle management.

use crate::config::SettlementConfig;
use crate::handlers::{invoices, payouts, subtrips};
use crate::services::metrics::HTTP_REQUESTS_TOTAL;
use crate::services::{get_metrics, Database};
use axum::extract::{MatchedPath, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::{Json, Router};
use serde_json::json;
use service_core::error::AppError;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: SettlementConfig,
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "service": "settlement-service",
                "version": env!("CARGO_PKG_VERSION")
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unhealthy",
                "service": "settlement-service",
                "error": e.to_string()
            })),
        ),
    }
}

async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

async fn metrics_endpoint() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        get_metrics(),
    )
}

async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let response = next.run(request).await;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[&route, response.status().as_str()])
        .inc();

    response
}

/// Build the API router over the shared state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_endpoint))
        .route(
            "/subtrips",
            post(subtrips::create_subtrip).get(subtrips::list_subtrips),
        )
        .route(
            "/subtrips/:id",
            get(subtrips::get_subtrip)
                .patch(subtrips::update_subtrip)
                .delete(subtrips::delete_subtrip),
        )
        .route("/subtrips/:id/material", post(subtrips::add_material_info))
        .route("/subtrips/:id/receive", post(subtrips::receive_subtrip))
        .route("/subtrips/:id/resolve-error", post(subtrips::resolve_error))
        .route("/subtrips/:id/close", post(subtrips::close_subtrip))
        .route(
            "/subtrips/:id/expenses",
            post(subtrips::add_expense).get(subtrips::list_expenses),
        )
        .route(
            "/subtrips/:id/expenses/:expense_id",
            delete(subtrips::delete_expense),
        )
        .route("/subtrips/:id/events", get(subtrips::list_subtrip_events))
        .route("/events", get(subtrips::list_events_by_range))
        .route(
            "/invoices",
            post(invoices::create_invoice).get(invoices::list_invoices),
        )
        .route("/invoices/bulk", post(invoices::create_invoices_bulk))
        .route("/invoices/mark-overdue", post(invoices::mark_overdue))
        .route(
            "/invoices/:id",
            get(invoices::get_invoice).delete(invoices::delete_invoice),
        )
        .route("/invoices/:id/cancel", post(invoices::cancel_invoice))
        .route(
            "/invoices/:id/payments",
            post(invoices::record_payment).get(invoices::list_payments),
        )
        .route(
            "/driver-salaries",
            post(payouts::create_driver_salary).get(payouts::list_driver_salaries),
        )
        .route(
            "/driver-salaries/bulk",
            post(payouts::create_driver_salaries_bulk),
        )
        .route(
            "/driver-salaries/:id",
            get(payouts::get_driver_salary).delete(payouts::delete_driver_salary),
        )
        .route(
            "/driver-salaries/:id/cancel",
            post(payouts::cancel_driver_salary),
        )
        .route(
            "/driver-salaries/:id/mark-paid",
            patch(payouts::mark_driver_salary_paid),
        )
        .route(
            "/transporter-payments",
            post(payouts::create_transporter_payment).get(payouts::list_transporter_payments),
        )
        .route(
            "/transporter-payments/bulk",
            post(payouts::create_transporter_payments_bulk),
        )
        .route(
            "/transporter-payments/:id",
            get(payouts::get_transporter_payment).delete(payouts::delete_transporter_payment),
        )
        .route(
            "/transporter-payments/:id/cancel",
            post(payouts::cancel_transporter_payment),
        )
        .route(
            "/transporter-payments/:id/mark-paid",
            patch(payouts::mark_transporter_payment_paid),
        )
        .layer(middleware::from_fn(track_requests))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: SettlementConfig) -> Result<Self, AppError> {
        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await?;

        db.run_migrations().await?;

        let state = AppState {
            db,
            config: config.clone(),
        };

        // Port 0 binds a random port for testing.
        let addr = format!("{}:{}", config.server.host, config.server.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!("Settlement service listening on port {}", port);

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a handle to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);
        axum::serve(self.listener, router).await
    }
}
