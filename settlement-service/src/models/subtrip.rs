//! Subtrip model for settlement-service.
//!
//! A subtrip is one loaded or empty leg of a vehicle's movement and the unit
//! of billing. It owns the authoritative lifecycle status and the three
//! settlement claim fields.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Subtrip lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubtripStatus {
    InQueue,
    Loaded,
    Error,
    Received,
    Billed,
}

impl SubtripStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubtripStatus::InQueue => "in-queue",
            SubtripStatus::Loaded => "loaded",
            SubtripStatus::Error => "error",
            SubtripStatus::Received => "received",
            SubtripStatus::Billed => "billed",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "loaded" => SubtripStatus::Loaded,
            "error" => SubtripStatus::Error,
            "received" => SubtripStatus::Received,
            "billed" => SubtripStatus::Billed,
            _ => SubtripStatus::InQueue,
        }
    }

    /// Forward transitions of the lifecycle state machine. The reversal path
    /// `billed -> received` is privileged to the settlement engine and is not
    /// listed here.
    pub fn can_transition_to(&self, next: SubtripStatus) -> bool {
        use SubtripStatus::*;
        matches!(
            (self, next),
            (InQueue, Loaded)
                | (Loaded, Received)
                | (Loaded, Error)
                | (Error, Received)
                | (Received, Billed)
        )
    }

    /// Once billed, a subtrip rejects ordinary field mutation.
    pub fn is_locked(&self) -> bool {
        matches!(self, SubtripStatus::Billed)
    }
}

/// Subtrip document.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Subtrip {
    pub subtrip_id: Uuid,
    pub tenant_id: Uuid,
    pub subtrip_no: String,
    pub trip_id: Option<Uuid>,
    pub is_empty: bool,
    pub status: String,
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    pub driver_id: Uuid,
    pub route_id: Uuid,
    pub loading_point: String,
    pub unloading_point: String,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub material_name: Option<String>,
    pub loading_weight: Option<Decimal>,
    pub unloading_weight: Option<Decimal>,
    pub rate: Option<Decimal>,
    pub shortage_weight: Option<Decimal>,
    pub shortage_rate: Option<Decimal>,
    pub has_error: bool,
    pub error_remarks: Option<String>,
    pub invoice_id: Option<Uuid>,
    pub driver_salary_id: Option<Uuid>,
    pub transporter_payment_id: Option<Uuid>,
    pub remarks: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl Subtrip {
    pub fn status(&self) -> SubtripStatus {
        SubtripStatus::from_string(&self.status)
    }

    /// True when any settlement document currently claims this subtrip.
    pub fn is_claimed(&self) -> bool {
        self.invoice_id.is_some()
            || self.driver_salary_id.is_some()
            || self.transporter_payment_id.is_some()
    }
}

/// Material data captured at loading time.
#[derive(Debug, Clone, Deserialize)]
pub struct MaterialInfo {
    pub material_name: String,
    pub loading_weight: Decimal,
    pub rate: Decimal,
    /// Manually entered driver advance, recorded as an expense alongside the
    /// route's auto-generated ones.
    pub driver_advance: Option<Decimal>,
}

/// Receipt data captured at unloading time.
#[derive(Debug, Clone, Deserialize)]
pub struct ReceiveInfo {
    pub unloading_weight: Decimal,
    pub end_date: NaiveDate,
    pub shortage_weight: Option<Decimal>,
    pub shortage_rate: Option<Decimal>,
    pub has_error: bool,
    pub error_remarks: Option<String>,
}

/// Input for creating a subtrip.
#[derive(Debug, Clone)]
pub struct CreateSubtrip {
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    pub driver_id: Uuid,
    pub route_id: Uuid,
    pub loading_point: String,
    pub unloading_point: String,
    pub start_date: NaiveDate,
    pub is_empty: bool,
    pub remarks: Option<String>,
    /// Market/loaded jobs supply material data up front and start `loaded`.
    pub material: Option<MaterialInfo>,
}

/// Explicit typed patch for general subtrip updates.
///
/// The audit diff is derived from these fields, so the changeset is known at
/// compile time rather than inferred from arbitrary input keys.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubtripPatch {
    pub loading_point: Option<String>,
    pub unloading_point: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub material_name: Option<String>,
    pub loading_weight: Option<Decimal>,
    pub unloading_weight: Option<Decimal>,
    pub rate: Option<Decimal>,
    pub shortage_weight: Option<Decimal>,
    pub shortage_rate: Option<Decimal>,
    pub remarks: Option<String>,
    pub status: Option<SubtripStatus>,
}

/// One changed field in a patch, with old and new values.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldChange {
    pub field: &'static str,
    pub from: serde_json::Value,
    pub to: serde_json::Value,
}

impl SubtripPatch {
    /// Field-level diff against the current subtrip. Unchanged fields are
    /// omitted even when present in the patch.
    pub fn diff(&self, current: &Subtrip) -> Vec<FieldChange> {
        fn push<T: Serialize + PartialEq>(
            changes: &mut Vec<FieldChange>,
            field: &'static str,
            current: &T,
            patched: &Option<T>,
        ) {
            if let Some(next) = patched {
                if next != current {
                    changes.push(FieldChange {
                        field,
                        from: serde_json::to_value(current).unwrap_or(serde_json::Value::Null),
                        to: serde_json::to_value(next).unwrap_or(serde_json::Value::Null),
                    });
                }
            }
        }

        let mut changes = Vec::new();
        push(
            &mut changes,
            "loading_point",
            &current.loading_point,
            &self.loading_point,
        );
        push(
            &mut changes,
            "unloading_point",
            &current.unloading_point,
            &self.unloading_point,
        );
        push(
            &mut changes,
            "start_date",
            &current.start_date,
            &self.start_date,
        );
        push(&mut changes, "end_date", &current.end_date, &self.end_date.map(Some));
        push(
            &mut changes,
            "material_name",
            &current.material_name,
            &self.material_name.clone().map(Some),
        );
        push(
            &mut changes,
            "loading_weight",
            &current.loading_weight,
            &self.loading_weight.map(Some),
        );
        push(
            &mut changes,
            "unloading_weight",
            &current.unloading_weight,
            &self.unloading_weight.map(Some),
        );
        push(&mut changes, "rate", &current.rate, &self.rate.map(Some));
        push(
            &mut changes,
            "shortage_weight",
            &current.shortage_weight,
            &self.shortage_weight.map(Some),
        );
        push(
            &mut changes,
            "shortage_rate",
            &current.shortage_rate,
            &self.shortage_rate.map(Some),
        );
        push(
            &mut changes,
            "remarks",
            &current.remarks,
            &self.remarks.clone().map(Some),
        );
        if let Some(status) = self.status {
            if status != current.status() {
                changes.push(FieldChange {
                    field: "status",
                    from: serde_json::Value::String(current.status.clone()),
                    to: serde_json::Value::String(status.as_str().to_string()),
                });
            }
        }
        changes
    }

    /// Details payload for the generic `updated` audit event:
    /// `{field: {from, to}}`.
    pub fn diff_details(changes: &[FieldChange]) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for change in changes {
            map.insert(
                change.field.to_string(),
                serde_json::json!({ "from": change.from, "to": change.to }),
            );
        }
        serde_json::Value::Object(map)
    }
}

/// Expense category for a subtrip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExpenseType {
    DriverSalary,
    Toll,
    RouteAdvance,
    DriverAdvance,
    Other,
}

impl ExpenseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpenseType::DriverSalary => "driver-salary",
            ExpenseType::Toll => "toll",
            ExpenseType::RouteAdvance => "route-advance",
            ExpenseType::DriverAdvance => "driver-advance",
            ExpenseType::Other => "other",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "driver-salary" => ExpenseType::DriverSalary,
            "toll" => ExpenseType::Toll,
            "route-advance" => ExpenseType::RouteAdvance,
            "driver-advance" => ExpenseType::DriverAdvance,
            _ => ExpenseType::Other,
        }
    }
}

/// Expense owned by a subtrip (N:1).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Expense {
    pub expense_id: Uuid,
    pub tenant_id: Uuid,
    pub subtrip_id: Uuid,
    pub expense_type: String,
    pub amount: Decimal,
    pub remarks: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Filter parameters for listing subtrips.
#[derive(Debug, Clone, Default)]
pub struct ListSubtripsFilter {
    pub status: Option<SubtripStatus>,
    pub customer_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}
