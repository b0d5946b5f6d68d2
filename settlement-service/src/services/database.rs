//! Database service for settlement-service: connection pool, sequence
//! counters, master-data lookups, the subtrip lifecycle and the audit trail.
//!
//! Settlement document operations live in `services/settlements.rs`; both
//! files share the invariant that subtrips and counters are only ever
//! mutated through these methods.

use crate::models::{
    CreateSubtrip, Customer, Driver, EventType, Expense, ExpenseType, ListSubtripsFilter,
    MaterialInfo, ReceiveInfo, RouteExpenseConfig, Subtrip, SubtripEvent, SubtripPatch,
    SubtripStatus, Tenant, Transporter, Trip, Vehicle,
};
use crate::services::metrics::{DB_QUERY_DURATION, SUBTRIP_TRANSITIONS_TOTAL};
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::PgExecutor;
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

/// Column list shared by every subtrip query (also used by the settlement
/// engine's locked fetches).
pub(crate) const SUBTRIP_COLUMNS: &str = "subtrip_id, tenant_id, subtrip_no, trip_id, is_empty, \
    status, customer_id, vehicle_id, driver_id, route_id, loading_point, unloading_point, \
    start_date, end_date, material_name, loading_weight, unloading_weight, rate, \
    shortage_weight, shortage_rate, has_error, error_remarks, invoice_id, driver_salary_id, \
    transporter_payment_id, remarks, created_utc";

const EVENT_COLUMNS: &str =
    "event_id, tenant_id, subtrip_id, event_type, details, user_id, created_utc";

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "settlement-service"))]
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

    /// Check database health.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
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

    // -------------------------------------------------------------------------
    // Sequence Generator
    // -------------------------------------------------------------------------

    /// Atomic increment-and-read of the `(tenant, model)` counter, on the
    /// caller's executor so document numbering can join a larger
    /// transaction. The single-statement upsert serializes concurrent
    /// callers on the counter row; no two callers ever see the same value.
    pub(crate) async fn next_sequence_on<'e, E>(
        executor: E,
        tenant_id: Uuid,
        model: &str,
    ) -> Result<i64, AppError>
    where
        E: PgExecutor<'e>,
    {
        let seq: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO counters (tenant_id, model, seq)
            VALUES ($1, $2, 1)
            ON CONFLICT (tenant_id, model)
            DO UPDATE SET seq = counters.seq + 1
            RETURNING seq
            "#,
        )
        .bind(tenant_id)
        .bind(model)
        .fetch_one(executor)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to allocate sequence: {}", e))
        })?;

        Ok(seq)
    }

    /// Allocate the next sequence number outside any transaction.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, model = %model))]
    pub async fn next_sequence(&self, tenant_id: Uuid, model: &str) -> Result<i64, AppError> {
        Self::next_sequence_on(&self.pool, tenant_id, model).await
    }

    // -------------------------------------------------------------------------
    // Master-data lookups (read-only)
    // -------------------------------------------------------------------------

    pub async fn get_tenant(&self, tenant_id: Uuid) -> Result<Option<Tenant>, AppError> {
        let tenant = sqlx::query_as::<_, Tenant>(
            "SELECT tenant_id, name, state FROM tenants WHERE tenant_id = $1",
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get tenant: {}", e)))?;
        Ok(tenant)
    }

    pub async fn get_customer(
        &self,
        tenant_id: Uuid,
        customer_id: Uuid,
    ) -> Result<Option<Customer>, AppError> {
        let customer = sqlx::query_as::<_, Customer>(
            r#"
            SELECT customer_id, tenant_id, name, state, gst_enabled, gst_rate,
                invoice_prefix, invoice_suffix, invoice_pay_within
            FROM customers
            WHERE tenant_id = $1 AND customer_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get customer: {}", e)))?;
        Ok(customer)
    }

    pub async fn get_driver(
        &self,
        tenant_id: Uuid,
        driver_id: Uuid,
    ) -> Result<Option<Driver>, AppError> {
        let driver = sqlx::query_as::<_, Driver>(
            "SELECT driver_id, tenant_id, name FROM drivers WHERE tenant_id = $1 AND driver_id = $2",
        )
        .bind(tenant_id)
        .bind(driver_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get driver: {}", e)))?;
        Ok(driver)
    }

    pub async fn get_transporter(
        &self,
        tenant_id: Uuid,
        transporter_id: Uuid,
    ) -> Result<Option<Transporter>, AppError> {
        let transporter = sqlx::query_as::<_, Transporter>(
            r#"
            SELECT transporter_id, tenant_id, name, state, gst_enabled, gst_rate, tds_percentage
            FROM transporters
            WHERE tenant_id = $1 AND transporter_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(transporter_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get transporter: {}", e))
        })?;
        Ok(transporter)
    }

    pub async fn get_vehicle(
        &self,
        tenant_id: Uuid,
        vehicle_id: Uuid,
    ) -> Result<Option<Vehicle>, AppError> {
        let vehicle = sqlx::query_as::<_, Vehicle>(
            r#"
            SELECT vehicle_id, tenant_id, vehicle_no, vehicle_type, is_own, transporter_id
            FROM vehicles
            WHERE tenant_id = $1 AND vehicle_id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get vehicle: {}", e)))?;
        Ok(vehicle)
    }

    pub async fn route_exists(&self, tenant_id: Uuid, route_id: Uuid) -> Result<bool, AppError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM routes WHERE tenant_id = $1 AND route_id = $2)",
        )
        .bind(tenant_id)
        .bind(route_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to check route: {}", e)))?;
        Ok(exists)
    }

    /// Route auto-expense configuration for a vehicle type, read only at
    /// material-entry time.
    pub async fn get_route_expense_config(
        &self,
        tenant_id: Uuid,
        route_id: Uuid,
        vehicle_type: &str,
    ) -> Result<Option<RouteExpenseConfig>, AppError> {
        let config = sqlx::query_as::<_, RouteExpenseConfig>(
            r#"
            SELECT config_id, tenant_id, route_id, vehicle_type, fixed_salary, percent_salary,
                toll_amount, route_advance
            FROM route_expense_configs
            WHERE tenant_id = $1 AND route_id = $2 AND vehicle_type = $3
            "#,
        )
        .bind(tenant_id)
        .bind(route_id)
        .bind(vehicle_type)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to get route config: {}", e))
        })?;
        Ok(config)
    }

    /// Open trip for a tenant-owned vehicle, if any.
    pub async fn find_open_trip(
        &self,
        tenant_id: Uuid,
        vehicle_id: Uuid,
    ) -> Result<Option<Trip>, AppError> {
        let trip = sqlx::query_as::<_, Trip>(
            r#"
            SELECT trip_id, tenant_id, vehicle_id, status, created_utc
            FROM trips
            WHERE tenant_id = $1 AND vehicle_id = $2 AND status = 'open'
            ORDER BY created_utc DESC
            LIMIT 1
            "#,
        )
        .bind(tenant_id)
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to find trip: {}", e)))?;
        Ok(trip)
    }

    // -------------------------------------------------------------------------
    // Audit Trail
    // -------------------------------------------------------------------------

    /// Append one immutable audit row on the caller's executor, so lifecycle
    /// and settlement writes land with their events or not at all.
    pub(crate) async fn record_event_on<'e, E>(
        executor: E,
        tenant_id: Uuid,
        subtrip_id: Uuid,
        event_type: EventType,
        details: serde_json::Value,
        user_id: Option<Uuid>,
    ) -> Result<(), AppError>
    where
        E: PgExecutor<'e>,
    {
        sqlx::query(
            r#"
            INSERT INTO subtrip_events (event_id, tenant_id, subtrip_id, event_type, details, user_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(subtrip_id)
        .bind(event_type.as_str())
        .bind(details)
        .bind(user_id)
        .execute(executor)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to record event: {}", e)))?;
        Ok(())
    }

    /// Events for one subtrip, oldest first.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, subtrip_id = %subtrip_id))]
    pub async fn list_subtrip_events(
        &self,
        tenant_id: Uuid,
        subtrip_id: Uuid,
    ) -> Result<Vec<SubtripEvent>, AppError> {
        let events = sqlx::query_as::<_, SubtripEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM subtrip_events \
             WHERE tenant_id = $1 AND subtrip_id = $2 ORDER BY created_utc, event_id",
        ))
        .bind(tenant_id)
        .bind(subtrip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list events: {}", e)))?;
        Ok(events)
    }

    /// Events across subtrips within a date range, for day-wise summaries.
    #[instrument(skip(self), fields(tenant_id = %tenant_id))]
    pub async fn list_events_by_range(
        &self,
        tenant_id: Uuid,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<SubtripEvent>, AppError> {
        let events = sqlx::query_as::<_, SubtripEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM subtrip_events \
             WHERE tenant_id = $1 AND created_utc >= $2 AND created_utc < $3 + INTERVAL '1 day' \
             ORDER BY created_utc, event_id",
        ))
        .bind(tenant_id)
        .bind(start_date)
        .bind(end_date)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list events: {}", e)))?;
        Ok(events)
    }

    // -------------------------------------------------------------------------
    // Subtrip Lifecycle
    // -------------------------------------------------------------------------

    /// Create a subtrip in `in-queue` (or `loaded` when material data is
    /// supplied up front). Tenant-owned vehicles link to their open trip.
    #[instrument(skip(self, input, user_id), fields(tenant_id = %input.tenant_id))]
    pub async fn create_subtrip(
        &self,
        input: &CreateSubtrip,
        user_id: Option<Uuid>,
    ) -> Result<Subtrip, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_subtrip"])
            .start_timer();

        let vehicle = self
            .get_vehicle(input.tenant_id, input.vehicle_id)
            .await?
            .ok_or_else(|| {
                AppError::ValidationError(anyhow::anyhow!("vehicle {} not found", input.vehicle_id))
            })?;
        self.get_driver(input.tenant_id, input.driver_id)
            .await?
            .ok_or_else(|| {
                AppError::ValidationError(anyhow::anyhow!("driver {} not found", input.driver_id))
            })?;
        self.get_customer(input.tenant_id, input.customer_id)
            .await?
            .ok_or_else(|| {
                AppError::ValidationError(anyhow::anyhow!(
                    "customer {} not found",
                    input.customer_id
                ))
            })?;
        if !self.route_exists(input.tenant_id, input.route_id).await? {
            return Err(AppError::ValidationError(anyhow::anyhow!(
                "route {} not found",
                input.route_id
            )));
        }

        // Market vehicles skip trip association entirely.
        let trip_id = if vehicle.is_own {
            self.find_open_trip(input.tenant_id, input.vehicle_id)
                .await?
                .map(|t| t.trip_id)
        } else {
            None
        };

        let status = if input.material.is_some() {
            SubtripStatus::Loaded
        } else {
            SubtripStatus::InQueue
        };

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let seq = Self::next_sequence_on(&mut *tx, input.tenant_id, "subtrip").await?;
        let subtrip_no = format!("st-{}", seq);
        let subtrip_id = Uuid::new_v4();

        let material = input.material.as_ref();
        let subtrip = sqlx::query_as::<_, Subtrip>(&format!(
            r#"
            INSERT INTO subtrips (
                subtrip_id, tenant_id, subtrip_no, trip_id, is_empty, status,
                customer_id, vehicle_id, driver_id, route_id, loading_point, unloading_point,
                start_date, material_name, loading_weight, rate, remarks
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            RETURNING {SUBTRIP_COLUMNS}
            "#,
        ))
        .bind(subtrip_id)
        .bind(input.tenant_id)
        .bind(&subtrip_no)
        .bind(trip_id)
        .bind(input.is_empty)
        .bind(status.as_str())
        .bind(input.customer_id)
        .bind(input.vehicle_id)
        .bind(input.driver_id)
        .bind(input.route_id)
        .bind(&input.loading_point)
        .bind(&input.unloading_point)
        .bind(input.start_date)
        .bind(material.map(|m| m.material_name.clone()))
        .bind(material.map(|m| m.loading_weight))
        .bind(material.map(|m| m.rate))
        .bind(&input.remarks)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to create subtrip: {}", e)))?;

        Self::record_event_on(
            &mut *tx,
            input.tenant_id,
            subtrip_id,
            EventType::Created,
            serde_json::json!({ "subtrip_no": subtrip_no, "status": status.as_str() }),
            user_id,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        SUBTRIP_TRANSITIONS_TOTAL
            .with_label_values(&[status.as_str()])
            .inc();

        info!(subtrip_id = %subtrip.subtrip_id, subtrip_no = %subtrip.subtrip_no, "Subtrip created");

        Ok(subtrip)
    }

    /// Get a subtrip by ID.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, subtrip_id = %subtrip_id))]
    pub async fn get_subtrip(
        &self,
        tenant_id: Uuid,
        subtrip_id: Uuid,
    ) -> Result<Option<Subtrip>, AppError> {
        let subtrip = sqlx::query_as::<_, Subtrip>(&format!(
            "SELECT {SUBTRIP_COLUMNS} FROM subtrips WHERE tenant_id = $1 AND subtrip_id = $2",
        ))
        .bind(tenant_id)
        .bind(subtrip_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to get subtrip: {}", e)))?;
        Ok(subtrip)
    }

    /// List subtrips for a tenant.
    #[instrument(skip(self, filter), fields(tenant_id = %tenant_id))]
    pub async fn list_subtrips(
        &self,
        tenant_id: Uuid,
        filter: &ListSubtripsFilter,
    ) -> Result<Vec<Subtrip>, AppError> {
        let limit = filter.page_size.clamp(1, 100) as i64;
        let status_str = filter.status.map(|s| s.as_str().to_string());
        let cursor = filter.page_token.unwrap_or(Uuid::nil());

        let subtrips = sqlx::query_as::<_, Subtrip>(&format!(
            r#"
            SELECT {SUBTRIP_COLUMNS}
            FROM subtrips
            WHERE tenant_id = $1
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::uuid IS NULL OR customer_id = $3)
              AND ($4::uuid IS NULL OR vehicle_id = $4)
              AND ($5::uuid IS NULL OR driver_id = $5)
              AND ($6::date IS NULL OR start_date >= $6)
              AND ($7::date IS NULL OR start_date <= $7)
              AND subtrip_id > $8
            ORDER BY subtrip_id
            LIMIT $9
            "#,
        ))
        .bind(tenant_id)
        .bind(&status_str)
        .bind(filter.customer_id)
        .bind(filter.vehicle_id)
        .bind(filter.driver_id)
        .bind(filter.start_date)
        .bind(filter.end_date)
        .bind(cursor)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list subtrips: {}", e)))?;

        Ok(subtrips)
    }

    /// Lock-and-fetch a subtrip inside a transaction.
    async fn fetch_subtrip_for_update(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        tenant_id: Uuid,
        subtrip_id: Uuid,
    ) -> Result<Subtrip, AppError> {
        sqlx::query_as::<_, Subtrip>(&format!(
            "SELECT {SUBTRIP_COLUMNS} FROM subtrips \
             WHERE tenant_id = $1 AND subtrip_id = $2 FOR UPDATE",
        ))
        .bind(tenant_id)
        .bind(subtrip_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch subtrip: {}", e)))?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("subtrip {} not found", subtrip_id)))
    }

    /// Record material loading and transition to `loaded`. Tenant-owned
    /// vehicles also get the route's auto-generated expenses, atomically
    /// with the subtrip update.
    #[instrument(skip(self, material, user_id), fields(tenant_id = %tenant_id, subtrip_id = %subtrip_id))]
    pub async fn add_material_info(
        &self,
        tenant_id: Uuid,
        subtrip_id: Uuid,
        material: &MaterialInfo,
        user_id: Option<Uuid>,
    ) -> Result<Subtrip, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["add_material_info"])
            .start_timer();

        // Resolve lookups before entering the atomic unit.
        let current = self
            .get_subtrip(tenant_id, subtrip_id)
            .await?
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("subtrip {} not found", subtrip_id)))?;
        let vehicle = self
            .get_vehicle(tenant_id, current.vehicle_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(anyhow::anyhow!("vehicle {} not found", current.vehicle_id))
            })?;

        let auto_config = if vehicle.is_own {
            let config = self
                .get_route_expense_config(tenant_id, current.route_id, &vehicle.vehicle_type)
                .await?
                .ok_or_else(|| {
                    AppError::NotFound(anyhow::anyhow!(
                        "no expense configuration for route {} and vehicle type {}",
                        current.route_id,
                        vehicle.vehicle_type
                    ))
                })?;
            Some(config)
        } else {
            None
        };

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let subtrip = Self::fetch_subtrip_for_update(&mut tx, tenant_id, subtrip_id).await?;
        if subtrip.status().is_locked() {
            return Err(AppError::Locked(anyhow::anyhow!(
                "subtrip {} is billed and cannot be modified",
                subtrip.subtrip_no
            )));
        }

        let updated = sqlx::query_as::<_, Subtrip>(&format!(
            r#"
            UPDATE subtrips
            SET material_name = $3, loading_weight = $4, rate = $5, status = 'loaded'
            WHERE tenant_id = $1 AND subtrip_id = $2
            RETURNING {SUBTRIP_COLUMNS}
            "#,
        ))
        .bind(tenant_id)
        .bind(subtrip_id)
        .bind(&material.material_name)
        .bind(material.loading_weight)
        .bind(material.rate)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to add material: {}", e)))?;

        Self::record_event_on(
            &mut *tx,
            tenant_id,
            subtrip_id,
            EventType::MaterialAdded,
            serde_json::json!({
                "material_name": material.material_name,
                "loading_weight": material.loading_weight,
                "rate": material.rate,
            }),
            user_id,
        )
        .await?;

        // Route-configured expenses for owned vehicles, plus any manual
        // driver advance.
        let mut expenses: Vec<(ExpenseType, Decimal)> = Vec::new();
        if let Some(config) = auto_config {
            let freight = material.rate * material.loading_weight;
            let salary = match (config.fixed_salary, config.percent_salary) {
                (Some(fixed), _) => Some(fixed),
                (None, Some(pct)) => Some(freight * pct / Decimal::ONE_HUNDRED),
                (None, None) => None,
            };
            if let Some(amount) = salary {
                expenses.push((ExpenseType::DriverSalary, amount));
            }
            if let Some(toll) = config.toll_amount {
                expenses.push((ExpenseType::Toll, toll));
            }
            if let Some(advance) = config.route_advance {
                expenses.push((ExpenseType::RouteAdvance, advance));
            }
        }
        if let Some(advance) = material.driver_advance {
            expenses.push((ExpenseType::DriverAdvance, advance));
        }

        for (expense_type, amount) in expenses {
            sqlx::query(
                r#"
                INSERT INTO expenses (expense_id, tenant_id, subtrip_id, expense_type, amount)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(tenant_id)
            .bind(subtrip_id)
            .bind(expense_type.as_str())
            .bind(amount)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to insert expense: {}", e))
            })?;

            Self::record_event_on(
                &mut *tx,
                tenant_id,
                subtrip_id,
                EventType::ExpenseAdded,
                serde_json::json!({ "expense_type": expense_type.as_str(), "amount": amount }),
                user_id,
            )
            .await?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        SUBTRIP_TRANSITIONS_TOTAL.with_label_values(&["loaded"]).inc();

        info!(subtrip_no = %updated.subtrip_no, "Material info added");

        Ok(updated)
    }

    /// Record delivery receipt: `loaded -> received`, or `loaded -> error`
    /// when the receipt reports an error.
    #[instrument(skip(self, receipt, user_id), fields(tenant_id = %tenant_id, subtrip_id = %subtrip_id))]
    pub async fn receive_subtrip(
        &self,
        tenant_id: Uuid,
        subtrip_id: Uuid,
        receipt: &ReceiveInfo,
        user_id: Option<Uuid>,
    ) -> Result<Subtrip, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["receive_subtrip"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let subtrip = Self::fetch_subtrip_for_update(&mut tx, tenant_id, subtrip_id).await?;
        if subtrip.status() != SubtripStatus::Loaded {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "subtrip {} must be loaded to be received (currently {})",
                subtrip.subtrip_no,
                subtrip.status
            )));
        }

        let next_status = if receipt.has_error {
            SubtripStatus::Error
        } else {
            SubtripStatus::Received
        };

        let updated = sqlx::query_as::<_, Subtrip>(&format!(
            r#"
            UPDATE subtrips
            SET unloading_weight = $3, end_date = $4, shortage_weight = $5, shortage_rate = $6,
                has_error = $7, error_remarks = $8, status = $9
            WHERE tenant_id = $1 AND subtrip_id = $2
            RETURNING {SUBTRIP_COLUMNS}
            "#,
        ))
        .bind(tenant_id)
        .bind(subtrip_id)
        .bind(receipt.unloading_weight)
        .bind(receipt.end_date)
        .bind(receipt.shortage_weight)
        .bind(receipt.shortage_rate)
        .bind(receipt.has_error)
        .bind(&receipt.error_remarks)
        .bind(next_status.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to receive subtrip: {}", e)))?;

        let (event_type, details) = if receipt.has_error {
            (
                EventType::ErrorReported,
                serde_json::json!({
                    "error_remarks": receipt.error_remarks,
                    "unloading_weight": receipt.unloading_weight,
                }),
            )
        } else {
            (
                EventType::Received,
                serde_json::json!({ "unloading_weight": receipt.unloading_weight }),
            )
        };
        Self::record_event_on(&mut *tx, tenant_id, subtrip_id, event_type, details, user_id)
            .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();
        SUBTRIP_TRANSITIONS_TOTAL
            .with_label_values(&[next_status.as_str()])
            .inc();

        Ok(updated)
    }

    /// Resolve a delivery error: `error -> received`.
    #[instrument(skip(self, user_id), fields(tenant_id = %tenant_id, subtrip_id = %subtrip_id))]
    pub async fn resolve_error(
        &self,
        tenant_id: Uuid,
        subtrip_id: Uuid,
        remarks: &str,
        user_id: Option<Uuid>,
    ) -> Result<Subtrip, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let subtrip = Self::fetch_subtrip_for_update(&mut tx, tenant_id, subtrip_id).await?;
        if subtrip.status() != SubtripStatus::Error {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "subtrip {} has no unresolved error (currently {})",
                subtrip.subtrip_no,
                subtrip.status
            )));
        }

        let updated = sqlx::query_as::<_, Subtrip>(&format!(
            r#"
            UPDATE subtrips
            SET status = 'received', has_error = FALSE
            WHERE tenant_id = $1 AND subtrip_id = $2
            RETURNING {SUBTRIP_COLUMNS}
            "#,
        ))
        .bind(tenant_id)
        .bind(subtrip_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to resolve error: {}", e)))?;

        Self::record_event_on(
            &mut *tx,
            tenant_id,
            subtrip_id,
            EventType::ErrorResolved,
            serde_json::json!({ "remarks": remarks }),
            user_id,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        SUBTRIP_TRANSITIONS_TOTAL
            .with_label_values(&["received"])
            .inc();

        Ok(updated)
    }

    /// General field update via a typed patch. Rejected once billed; emits
    /// a `status_changed` event when the status is patched plus a generic
    /// `updated` event carrying the field-level diff.
    #[instrument(skip(self, patch, user_id), fields(tenant_id = %tenant_id, subtrip_id = %subtrip_id))]
    pub async fn update_subtrip(
        &self,
        tenant_id: Uuid,
        subtrip_id: Uuid,
        patch: &SubtripPatch,
        user_id: Option<Uuid>,
    ) -> Result<Subtrip, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["update_subtrip"])
            .start_timer();

        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let current = Self::fetch_subtrip_for_update(&mut tx, tenant_id, subtrip_id).await?;
        if current.status().is_locked() {
            return Err(AppError::Locked(anyhow::anyhow!(
                "subtrip {} is billed and cannot be modified",
                current.subtrip_no
            )));
        }

        if let Some(next) = patch.status {
            if next != current.status() && !current.status().can_transition_to(next) {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "invalid status transition {} -> {}",
                    current.status,
                    next.as_str()
                )));
            }
        }

        let changes = patch.diff(&current);
        if changes.is_empty() {
            return Ok(current);
        }

        let updated = sqlx::query_as::<_, Subtrip>(&format!(
            r#"
            UPDATE subtrips
            SET loading_point = COALESCE($3, loading_point),
                unloading_point = COALESCE($4, unloading_point),
                start_date = COALESCE($5, start_date),
                end_date = COALESCE($6, end_date),
                material_name = COALESCE($7, material_name),
                loading_weight = COALESCE($8, loading_weight),
                unloading_weight = COALESCE($9, unloading_weight),
                rate = COALESCE($10, rate),
                shortage_weight = COALESCE($11, shortage_weight),
                shortage_rate = COALESCE($12, shortage_rate),
                remarks = COALESCE($13, remarks),
                status = COALESCE($14, status)
            WHERE tenant_id = $1 AND subtrip_id = $2
            RETURNING {SUBTRIP_COLUMNS}
            "#,
        ))
        .bind(tenant_id)
        .bind(subtrip_id)
        .bind(&patch.loading_point)
        .bind(&patch.unloading_point)
        .bind(patch.start_date)
        .bind(patch.end_date)
        .bind(&patch.material_name)
        .bind(patch.loading_weight)
        .bind(patch.unloading_weight)
        .bind(patch.rate)
        .bind(patch.shortage_weight)
        .bind(patch.shortage_rate)
        .bind(&patch.remarks)
        .bind(patch.status.map(|s| s.as_str().to_string()))
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to update subtrip: {}", e)))?;

        if let Some(change) = changes.iter().find(|c| c.field == "status") {
            Self::record_event_on(
                &mut *tx,
                tenant_id,
                subtrip_id,
                EventType::StatusChanged,
                serde_json::json!({ "from": change.from, "to": change.to }),
                user_id,
            )
            .await?;
        }
        Self::record_event_on(
            &mut *tx,
            tenant_id,
            subtrip_id,
            EventType::Updated,
            SubtripPatch::diff_details(&changes),
            user_id,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        timer.observe_duration();

        Ok(updated)
    }

    /// Close an empty leg: `received -> billed`, the terminal transition for
    /// subtrips that never see a customer invoice.
    #[instrument(skip(self, user_id), fields(tenant_id = %tenant_id, subtrip_id = %subtrip_id))]
    pub async fn close_subtrip(
        &self,
        tenant_id: Uuid,
        subtrip_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<Subtrip, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let subtrip = Self::fetch_subtrip_for_update(&mut tx, tenant_id, subtrip_id).await?;
        if !subtrip.is_empty {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "subtrip {} is not an empty leg; it is billed via invoicing",
                subtrip.subtrip_no
            )));
        }
        if subtrip.status() != SubtripStatus::Received {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "subtrip {} must be received to close (currently {})",
                subtrip.subtrip_no,
                subtrip.status
            )));
        }

        let updated = sqlx::query_as::<_, Subtrip>(&format!(
            "UPDATE subtrips SET status = 'billed' \
             WHERE tenant_id = $1 AND subtrip_id = $2 RETURNING {SUBTRIP_COLUMNS}",
        ))
        .bind(tenant_id)
        .bind(subtrip_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to close subtrip: {}", e)))?;

        Self::record_event_on(
            &mut *tx,
            tenant_id,
            subtrip_id,
            EventType::StatusChanged,
            serde_json::json!({ "from": "received", "to": "billed" }),
            user_id,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        SUBTRIP_TRANSITIONS_TOTAL.with_label_values(&["billed"]).inc();

        Ok(updated)
    }

    /// Delete a subtrip with its owned expenses. Refused once billed or
    /// claimed by any settlement document. Audit events are retained.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, subtrip_id = %subtrip_id))]
    pub async fn delete_subtrip(&self, tenant_id: Uuid, subtrip_id: Uuid) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let subtrip = match sqlx::query_as::<_, Subtrip>(&format!(
            "SELECT {SUBTRIP_COLUMNS} FROM subtrips \
             WHERE tenant_id = $1 AND subtrip_id = $2 FOR UPDATE",
        ))
        .bind(tenant_id)
        .bind(subtrip_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to fetch subtrip: {}", e)))?
        {
            Some(s) => s,
            None => return Ok(false),
        };

        if subtrip.status().is_locked() || subtrip.is_claimed() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "subtrip {} is billed or claimed by a settlement document",
                subtrip.subtrip_no
            )));
        }

        sqlx::query("DELETE FROM expenses WHERE tenant_id = $1 AND subtrip_id = $2")
            .bind(tenant_id)
            .bind(subtrip_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete expenses: {}", e))
            })?;

        sqlx::query("DELETE FROM subtrips WHERE tenant_id = $1 AND subtrip_id = $2")
            .bind(tenant_id)
            .bind(subtrip_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(anyhow::anyhow!("Failed to delete subtrip: {}", e))
            })?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        info!(subtrip_no = %subtrip.subtrip_no, "Subtrip deleted");

        Ok(true)
    }

    // -------------------------------------------------------------------------
    // Expenses
    // -------------------------------------------------------------------------

    /// Add a manual expense to a subtrip.
    #[instrument(skip(self, user_id), fields(tenant_id = %tenant_id, subtrip_id = %subtrip_id))]
    pub async fn add_expense(
        &self,
        tenant_id: Uuid,
        subtrip_id: Uuid,
        expense_type: ExpenseType,
        amount: Decimal,
        remarks: Option<String>,
        user_id: Option<Uuid>,
    ) -> Result<Expense, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let subtrip = Self::fetch_subtrip_for_update(&mut tx, tenant_id, subtrip_id).await?;
        if subtrip.status().is_locked() {
            return Err(AppError::Locked(anyhow::anyhow!(
                "subtrip {} is billed and cannot take expenses",
                subtrip.subtrip_no
            )));
        }

        let expense = sqlx::query_as::<_, Expense>(
            r#"
            INSERT INTO expenses (expense_id, tenant_id, subtrip_id, expense_type, amount, remarks)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING expense_id, tenant_id, subtrip_id, expense_type, amount, remarks, created_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(tenant_id)
        .bind(subtrip_id)
        .bind(expense_type.as_str())
        .bind(amount)
        .bind(&remarks)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to add expense: {}", e)))?;

        Self::record_event_on(
            &mut *tx,
            tenant_id,
            subtrip_id,
            EventType::ExpenseAdded,
            serde_json::json!({ "expense_type": expense_type.as_str(), "amount": amount }),
            user_id,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        Ok(expense)
    }

    /// Delete an expense from a subtrip.
    #[instrument(skip(self, user_id), fields(tenant_id = %tenant_id, expense_id = %expense_id))]
    pub async fn delete_expense(
        &self,
        tenant_id: Uuid,
        subtrip_id: Uuid,
        expense_id: Uuid,
        user_id: Option<Uuid>,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to begin transaction: {}", e))
        })?;

        let subtrip = Self::fetch_subtrip_for_update(&mut tx, tenant_id, subtrip_id).await?;
        if subtrip.status().is_locked() {
            return Err(AppError::Locked(anyhow::anyhow!(
                "subtrip {} is billed and cannot be modified",
                subtrip.subtrip_no
            )));
        }

        let expense = sqlx::query_as::<_, Expense>(
            r#"
            DELETE FROM expenses
            WHERE tenant_id = $1 AND subtrip_id = $2 AND expense_id = $3
            RETURNING expense_id, tenant_id, subtrip_id, expense_type, amount, remarks, created_utc
            "#,
        )
        .bind(tenant_id)
        .bind(subtrip_id)
        .bind(expense_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to delete expense: {}", e)))?;

        let expense = match expense {
            Some(e) => e,
            None => return Ok(false),
        };

        Self::record_event_on(
            &mut *tx,
            tenant_id,
            subtrip_id,
            EventType::ExpenseDeleted,
            serde_json::json!({ "expense_type": expense.expense_type, "amount": expense.amount }),
            user_id,
        )
        .await?;

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(anyhow::anyhow!("Failed to commit transaction: {}", e))
        })?;

        Ok(true)
    }

    /// List expenses for a subtrip.
    #[instrument(skip(self), fields(tenant_id = %tenant_id, subtrip_id = %subtrip_id))]
    pub async fn list_expenses(
        &self,
        tenant_id: Uuid,
        subtrip_id: Uuid,
    ) -> Result<Vec<Expense>, AppError> {
        let expenses = sqlx::query_as::<_, Expense>(
            r#"
            SELECT expense_id, tenant_id, subtrip_id, expense_type, amount, remarks, created_utc
            FROM expenses
            WHERE tenant_id = $1 AND subtrip_id = $2
            ORDER BY created_utc, expense_id
            "#,
        )
        .bind(tenant_id)
        .bind(subtrip_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to list expenses: {}", e)))?;
        Ok(expenses)
    }
}
