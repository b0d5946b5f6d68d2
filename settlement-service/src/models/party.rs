//! Read-only master-data lookups consumed by the settlement engine.
//!
//! Customers, drivers, transporters, vehicles, routes and tenants are owned
//! by external collaborators; this service only reads the fields it needs
//! for eligibility gating and tax snapshots.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Tenant record; its registered state drives the intra/inter-state GST
/// comparison.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub name: String,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Customer {
    pub customer_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub state: Option<String>,
    pub gst_enabled: bool,
    pub gst_rate: Option<Decimal>,
    pub invoice_prefix: Option<String>,
    pub invoice_suffix: Option<String>,
    /// Payment terms in days, used to compute invoice due dates.
    pub invoice_pay_within: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Driver {
    pub driver_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Transporter {
    pub transporter_id: Uuid,
    pub tenant_id: Uuid,
    pub name: String,
    pub state: Option<String>,
    pub gst_enabled: bool,
    pub gst_rate: Option<Decimal>,
    pub tds_percentage: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Vehicle {
    pub vehicle_id: Uuid,
    pub tenant_id: Uuid,
    pub vehicle_no: String,
    pub vehicle_type: String,
    /// Tenant-owned vehicles get trip association and driver-salary payouts;
    /// market vehicles get transporter payouts instead.
    pub is_own: bool,
    pub transporter_id: Option<Uuid>,
}

/// Trip container for tenant-owned vehicles.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Trip {
    pub trip_id: Uuid,
    pub tenant_id: Uuid,
    pub vehicle_id: Uuid,
    pub status: String,
    pub created_utc: DateTime<Utc>,
}

/// Per-vehicle-type auto-expense configuration on a route, read only at
/// material-entry time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RouteExpenseConfig {
    pub config_id: Uuid,
    pub tenant_id: Uuid,
    pub route_id: Uuid,
    pub vehicle_type: String,
    pub fixed_salary: Option<Decimal>,
    /// Percentage of the weight-derived freight paid as driver salary when no
    /// fixed amount is configured.
    pub percent_salary: Option<Decimal>,
    pub toll_amount: Option<Decimal>,
    pub route_advance: Option<Decimal>,
}

/// Counterparty tax facts fed into the tax calculator.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxProfile {
    pub gst_enabled: bool,
    pub state: Option<String>,
    pub gst_rate: Option<Decimal>,
    pub tds_percentage: Option<Decimal>,
}

impl TaxProfile {
    pub fn of_customer(customer: &Customer) -> Self {
        Self {
            gst_enabled: customer.gst_enabled,
            state: customer.state.clone(),
            gst_rate: customer.gst_rate,
            tds_percentage: None,
        }
    }

    pub fn of_transporter(transporter: &Transporter) -> Self {
        Self {
            gst_enabled: transporter.gst_enabled,
            state: transporter.state.clone(),
            gst_rate: transporter.gst_rate,
            tds_percentage: transporter.tds_percentage,
        }
    }

    /// Drivers carry no GST registration or TDS; their payouts flow through
    /// the same calculator with a zero tax profile.
    pub fn of_driver() -> Self {
        Self {
            gst_enabled: false,
            state: None,
            gst_rate: None,
            tds_percentage: None,
        }
    }
}
