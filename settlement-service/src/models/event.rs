//! Append-only audit trail for subtrips.
//!
//! One immutable row per meaningful transition; rows are never updated or
//! deleted. Business code branches on `EventType` only — the rendered
//! message is display formatting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Created,
    MaterialAdded,
    Received,
    ErrorReported,
    ErrorResolved,
    ExpenseAdded,
    ExpenseDeleted,
    InvoiceGenerated,
    InvoiceDeleted,
    InvoicePaid,
    DriverSalaryGenerated,
    DriverSalaryDeleted,
    TransporterPaymentGenerated,
    TransporterPaymentDeleted,
    StatusChanged,
    Updated,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Created => "created",
            EventType::MaterialAdded => "material_added",
            EventType::Received => "received",
            EventType::ErrorReported => "error_reported",
            EventType::ErrorResolved => "error_resolved",
            EventType::ExpenseAdded => "expense_added",
            EventType::ExpenseDeleted => "expense_deleted",
            EventType::InvoiceGenerated => "invoice_generated",
            EventType::InvoiceDeleted => "invoice_deleted",
            EventType::InvoicePaid => "invoice_paid",
            EventType::DriverSalaryGenerated => "driver_salary_generated",
            EventType::DriverSalaryDeleted => "driver_salary_deleted",
            EventType::TransporterPaymentGenerated => "transporter_payment_generated",
            EventType::TransporterPaymentDeleted => "transporter_payment_deleted",
            EventType::StatusChanged => "status_changed",
            EventType::Updated => "updated",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "created" => Some(EventType::Created),
            "material_added" => Some(EventType::MaterialAdded),
            "received" => Some(EventType::Received),
            "error_reported" => Some(EventType::ErrorReported),
            "error_resolved" => Some(EventType::ErrorResolved),
            "expense_added" => Some(EventType::ExpenseAdded),
            "expense_deleted" => Some(EventType::ExpenseDeleted),
            "invoice_generated" => Some(EventType::InvoiceGenerated),
            "invoice_deleted" => Some(EventType::InvoiceDeleted),
            "invoice_paid" => Some(EventType::InvoicePaid),
            "driver_salary_generated" => Some(EventType::DriverSalaryGenerated),
            "driver_salary_deleted" => Some(EventType::DriverSalaryDeleted),
            "transporter_payment_generated" => Some(EventType::TransporterPaymentGenerated),
            "transporter_payment_deleted" => Some(EventType::TransporterPaymentDeleted),
            "status_changed" => Some(EventType::StatusChanged),
            "updated" => Some(EventType::Updated),
            _ => None,
        }
    }
}

/// Append-only audit record keyed by subtrip.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SubtripEvent {
    pub event_id: Uuid,
    pub tenant_id: Uuid,
    pub subtrip_id: Uuid,
    pub event_type: String,
    pub details: serde_json::Value,
    pub user_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

impl SubtripEvent {
    /// Human-readable message for display. Pure formatting over the event
    /// type and details payload.
    pub fn render(&self) -> String {
        let detail = |key: &str| -> String {
            self.details
                .get(key)
                .map(|v| match v {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .unwrap_or_default()
        };

        match EventType::from_string(&self.event_type) {
            Some(EventType::Created) => format!("Subtrip {} created", detail("subtrip_no")),
            Some(EventType::MaterialAdded) => format!(
                "Material {} loaded ({} MT @ {})",
                detail("material_name"),
                detail("loading_weight"),
                detail("rate")
            ),
            Some(EventType::Received) => {
                format!("Delivery received ({} MT unloaded)", detail("unloading_weight"))
            }
            Some(EventType::ErrorReported) => {
                format!("Delivery error reported: {}", detail("error_remarks"))
            }
            Some(EventType::ErrorResolved) => {
                format!("Delivery error resolved: {}", detail("remarks"))
            }
            Some(EventType::ExpenseAdded) => format!(
                "Expense added: {} {}",
                detail("expense_type"),
                detail("amount")
            ),
            Some(EventType::ExpenseDeleted) => format!(
                "Expense deleted: {} {}",
                detail("expense_type"),
                detail("amount")
            ),
            Some(EventType::InvoiceGenerated) => {
                format!("Invoice {} generated", detail("invoice_no"))
            }
            Some(EventType::InvoiceDeleted) => {
                format!("Invoice {} reversed", detail("invoice_no"))
            }
            Some(EventType::InvoicePaid) => format!(
                "Payment of {} recorded against invoice {}",
                detail("amount"),
                detail("invoice_no")
            ),
            Some(EventType::DriverSalaryGenerated) => {
                format!("Driver salary receipt {} generated", detail("receipt_no"))
            }
            Some(EventType::DriverSalaryDeleted) => {
                format!("Driver salary receipt {} reversed", detail("receipt_no"))
            }
            Some(EventType::TransporterPaymentGenerated) => {
                format!("Transporter payment {} generated", detail("receipt_no"))
            }
            Some(EventType::TransporterPaymentDeleted) => {
                format!("Transporter payment {} reversed", detail("receipt_no"))
            }
            Some(EventType::StatusChanged) => {
                format!("Status changed from {} to {}", detail("from"), detail("to"))
            }
            Some(EventType::Updated) => "Subtrip details updated".to_string(),
            None => format!("Unknown event: {}", self.event_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(event_type: EventType, details: serde_json::Value) -> SubtripEvent {
        SubtripEvent {
            event_id: Uuid::new_v4(),
            tenant_id: Uuid::new_v4(),
            subtrip_id: Uuid::new_v4(),
            event_type: event_type.as_str().to_string(),
            details,
            user_id: None,
            created_utc: Utc::now(),
        }
    }

    #[test]
    fn event_types_round_trip_through_strings() {
        for event_type in [
            EventType::Created,
            EventType::MaterialAdded,
            EventType::Received,
            EventType::ErrorReported,
            EventType::ErrorResolved,
            EventType::ExpenseAdded,
            EventType::ExpenseDeleted,
            EventType::InvoiceGenerated,
            EventType::InvoiceDeleted,
            EventType::InvoicePaid,
            EventType::DriverSalaryGenerated,
            EventType::DriverSalaryDeleted,
            EventType::TransporterPaymentGenerated,
            EventType::TransporterPaymentDeleted,
            EventType::StatusChanged,
            EventType::Updated,
        ] {
            assert_eq!(EventType::from_string(event_type.as_str()), Some(event_type));
        }
    }

    #[test]
    fn renders_status_change() {
        let event = event(
            EventType::StatusChanged,
            serde_json::json!({ "from": "received", "to": "billed" }),
        );
        assert_eq!(event.render(), "Status changed from received to billed");
    }

    #[test]
    fn renders_invoice_generation() {
        let event = event(
            EventType::InvoiceGenerated,
            serde_json::json!({ "invoice_no": "INV-12" }),
        );
        assert_eq!(event.render(), "Invoice INV-12 generated");
    }

    #[test]
    fn renders_unknown_event_without_panicking() {
        let mut e = event(EventType::Created, serde_json::json!({}));
        e.event_type = "mystery".to_string();
        assert_eq!(e.render(), "Unknown event: mystery");
    }
}
