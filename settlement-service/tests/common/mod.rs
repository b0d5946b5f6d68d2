//! Test helper module for settlement-service integration tests.
//!
//! Each test gets its own PostgreSQL schema for isolation. Tests are skipped
//! when TEST_DATABASE_URL is not set.

#![allow(dead_code)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use settlement_service::config::{DatabaseConfig, ServerConfig, SettlementConfig};
use settlement_service::models::{CreateSubtrip, MaterialInfo, ReceiveInfo, Subtrip};
use settlement_service::services::{init_metrics, Database};
use settlement_service::startup::Application;
use std::sync::atomic::{AtomicU32, Ordering};
use uuid::Uuid;

static SCHEMA_COUNTER: AtomicU32 = AtomicU32::new(0);

fn unique_schema_name() -> String {
    let counter = SCHEMA_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("test_settlement_{}_{}", std::process::id(), counter)
}

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub db: Database,
    schema_name: String,
    base_url: String,
}

impl TestApp {
    /// Spawn a test application on a random port with its own schema.
    /// Returns `None` (skipping the test) when no test database is
    /// configured.
    pub async fn spawn() -> Option<Self> {
        let base_url = match std::env::var("TEST_DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                eprintln!("TEST_DATABASE_URL not set; skipping integration test");
                return None;
            }
        };

        init_metrics();

        let schema_name = unique_schema_name();

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&base_url)
            .await
            .expect("Failed to connect to test database");

        sqlx::query(&format!("DROP SCHEMA IF EXISTS {} CASCADE", schema_name))
            .execute(&pool)
            .await
            .ok();
        sqlx::query(&format!("CREATE SCHEMA {}", schema_name))
            .execute(&pool)
            .await
            .expect("Failed to create test schema");
        pool.close().await;

        let separator = if base_url.contains('?') { "&" } else { "?" };
        let db_url_with_schema = format!(
            "{}{}options=-c search_path%3D{}",
            base_url, separator, schema_name
        );

        let config = SettlementConfig {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: db_url_with_schema.clone(),
                max_connections: 5,
                min_connections: 1,
            },
            default_gst_rate: Decimal::from(6),
            service_name: "settlement-service-test".to_string(),
            log_level: "warn".to_string(),
            otlp_endpoint: None,
        };

        let app = Application::build(config)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let db = app.db().clone();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to accept requests.
        let client = reqwest::Client::new();
        let health_url = format!("http://127.0.0.1:{}/health", port);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        Some(TestApp {
            address,
            port,
            db,
            schema_name,
            base_url,
        })
    }

    /// Drop this test's schema.
    pub async fn cleanup(&self) {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(1)
            .connect(&self.base_url)
            .await
            .ok();

        if let Some(pool) = pool {
            let _ = sqlx::query(&format!(
                "DROP SCHEMA IF EXISTS {} CASCADE",
                self.schema_name
            ))
            .execute(&pool)
            .await;
            pool.close().await;
        }
    }
}

/// IDs of the master data seeded into a test schema.
pub struct Seed {
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub driver_id: Uuid,
    pub transporter_id: Uuid,
    pub own_vehicle_id: Uuid,
    pub market_vehicle_id: Uuid,
    pub route_id: Uuid,
}

/// Seed one tenant with a GST-registered customer (intra-state, 6%), a
/// driver, a TDS-liable transporter, one owned and one market vehicle, a
/// route with expense configuration and an open trip.
pub async fn seed_master_data(db: &Database) -> Seed {
    let seed = Seed {
        tenant_id: Uuid::new_v4(),
        customer_id: Uuid::new_v4(),
        driver_id: Uuid::new_v4(),
        transporter_id: Uuid::new_v4(),
        own_vehicle_id: Uuid::new_v4(),
        market_vehicle_id: Uuid::new_v4(),
        route_id: Uuid::new_v4(),
    };
    let pool = db.pool();

    sqlx::query("INSERT INTO tenants (tenant_id, name, state) VALUES ($1, 'Test Carrier', 'Rajasthan')")
        .bind(seed.tenant_id)
        .execute(pool)
        .await
        .expect("Failed to seed tenant");

    sqlx::query(
        "INSERT INTO customers (customer_id, tenant_id, name, state, gst_enabled, gst_rate, invoice_pay_within) \
         VALUES ($1, $2, 'Acme Mines', 'Rajasthan', TRUE, 6, 30)",
    )
    .bind(seed.customer_id)
    .bind(seed.tenant_id)
    .execute(pool)
    .await
    .expect("Failed to seed customer");

    sqlx::query("INSERT INTO drivers (driver_id, tenant_id, name) VALUES ($1, $2, 'Ram Singh')")
        .bind(seed.driver_id)
        .bind(seed.tenant_id)
        .execute(pool)
        .await
        .expect("Failed to seed driver");

    sqlx::query(
        "INSERT INTO transporters (transporter_id, tenant_id, name, state, gst_enabled, tds_percentage) \
         VALUES ($1, $2, 'Gupta Roadlines', 'Gujarat', FALSE, 2)",
    )
    .bind(seed.transporter_id)
    .bind(seed.tenant_id)
    .execute(pool)
    .await
    .expect("Failed to seed transporter");

    sqlx::query(
        "INSERT INTO vehicles (vehicle_id, tenant_id, vehicle_no, vehicle_type, is_own) \
         VALUES ($1, $2, 'RJ14-GA-1234', 'truck', TRUE)",
    )
    .bind(seed.own_vehicle_id)
    .bind(seed.tenant_id)
    .execute(pool)
    .await
    .expect("Failed to seed owned vehicle");

    sqlx::query(
        "INSERT INTO vehicles (vehicle_id, tenant_id, vehicle_no, vehicle_type, is_own, transporter_id) \
         VALUES ($1, $2, 'GJ05-XY-9876', 'truck', FALSE, $3)",
    )
    .bind(seed.market_vehicle_id)
    .bind(seed.tenant_id)
    .bind(seed.transporter_id)
    .execute(pool)
    .await
    .expect("Failed to seed market vehicle");

    sqlx::query("INSERT INTO routes (route_id, tenant_id, name) VALUES ($1, $2, 'Jaipur-Surat')")
        .bind(seed.route_id)
        .bind(seed.tenant_id)
        .execute(pool)
        .await
        .expect("Failed to seed route");

    sqlx::query(
        "INSERT INTO route_expense_configs \
         (config_id, tenant_id, route_id, vehicle_type, fixed_salary, toll_amount, route_advance) \
         VALUES ($1, $2, $3, 'truck', 500, 300, 1000)",
    )
    .bind(Uuid::new_v4())
    .bind(seed.tenant_id)
    .bind(seed.route_id)
    .execute(pool)
    .await
    .expect("Failed to seed route expense config");

    sqlx::query("INSERT INTO trips (trip_id, tenant_id, vehicle_id, status) VALUES ($1, $2, $3, 'open')")
        .bind(Uuid::new_v4())
        .bind(seed.tenant_id)
        .bind(seed.own_vehicle_id)
        .execute(pool)
        .await
        .expect("Failed to seed trip");

    seed
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Create a subtrip with material data supplied up front (starts loaded).
pub async fn create_loaded_subtrip(
    db: &Database,
    seed: &Seed,
    vehicle_id: Uuid,
    rate: i64,
    loading_weight: i64,
) -> Subtrip {
    let input = CreateSubtrip {
        tenant_id: seed.tenant_id,
        customer_id: seed.customer_id,
        vehicle_id,
        driver_id: seed.driver_id,
        route_id: seed.route_id,
        loading_point: "Jaipur".to_string(),
        unloading_point: "Surat".to_string(),
        start_date: date(2026, 8, 1),
        is_empty: false,
        remarks: None,
        material: Some(MaterialInfo {
            material_name: "Limestone".to_string(),
            loading_weight: Decimal::from(loading_weight),
            rate: Decimal::from(rate),
            driver_advance: None,
        }),
    };
    db.create_subtrip(&input, None)
        .await
        .expect("Failed to create subtrip")
}

/// Create a loaded subtrip and receive it, optionally with shortage.
pub async fn create_received_subtrip(
    db: &Database,
    seed: &Seed,
    vehicle_id: Uuid,
    rate: i64,
    loading_weight: i64,
    shortage_weight: i64,
    shortage_rate: i64,
) -> Subtrip {
    let subtrip = create_loaded_subtrip(db, seed, vehicle_id, rate, loading_weight).await;
    let receipt = ReceiveInfo {
        unloading_weight: Decimal::from(loading_weight - shortage_weight),
        end_date: date(2026, 8, 3),
        shortage_weight: Some(Decimal::from(shortage_weight)),
        shortage_rate: Some(Decimal::from(shortage_rate)),
        has_error: false,
        error_remarks: None,
    };
    db.receive_subtrip(seed.tenant_id, subtrip.subtrip_id, &receipt, None)
        .await
        .expect("Failed to receive subtrip")
}
