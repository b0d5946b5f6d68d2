//! Settlement document models: Invoice, DriverSalaryReceipt and
//! TransporterPaymentReceipt, plus the frozen snapshot and tax value types
//! they embed.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// The three settlement instantiations sharing one claim protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettlementKind {
    Invoice,
    DriverSalary,
    TransporterPayment,
}

impl SettlementKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SettlementKind::Invoice => "invoice",
            SettlementKind::DriverSalary => "driver_salary",
            SettlementKind::TransporterPayment => "transporter_payment",
        }
    }
}

/// One GST/TDS component: the applied rate and the resulting amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TaxLine {
    pub rate: Decimal,
    pub amount: Decimal,
}

impl TaxLine {
    pub fn zero() -> Self {
        Self {
            rate: Decimal::ZERO,
            amount: Decimal::ZERO,
        }
    }
}

/// Jurisdiction-aware tax breakup frozen onto a settlement document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxBreakup {
    pub cgst: TaxLine,
    pub sgst: TaxLine,
    pub igst: TaxLine,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tds: Option<TaxLine>,
    pub total_tax: Decimal,
}

impl TaxBreakup {
    pub fn zero() -> Self {
        Self {
            cgst: TaxLine::zero(),
            sgst: TaxLine::zero(),
            igst: TaxLine::zero(),
            tds: None,
            total_tax: Decimal::ZERO,
        }
    }
}

/// Denormalized per-subtrip financial facts captured at claim time.
///
/// This is the single source of truth for the document's historical totals;
/// it is never recomputed from live subtrip data after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtripSnapshot {
    pub subtrip_id: Uuid,
    pub subtrip_no: String,
    pub vehicle_no: String,
    pub loading_point: String,
    pub unloading_point: String,
    pub start_date: NaiveDate,
    pub material_name: Option<String>,
    pub loading_weight: Decimal,
    pub unloading_weight: Option<Decimal>,
    pub rate: Decimal,
    pub freight_amount: Decimal,
    pub shortage_amount: Decimal,
    pub expense_total: Decimal,
    pub total_amount: Decimal,
}

/// Manual charge or deduction applied on top of the computed totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalCharge {
    pub label: String,
    pub amount: Decimal,
}

/// Aggregate money facts for a settlement document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SettlementSummary {
    pub subtotal: Decimal,
    pub shortage_total: Decimal,
    pub expense_total: Decimal,
    pub taxable_amount: Decimal,
    pub total_tax: Decimal,
    pub additional_total: Decimal,
    pub net_total: Decimal,
}

impl SettlementSummary {
    pub fn zero() -> Self {
        Self {
            subtotal: Decimal::ZERO,
            shortage_total: Decimal::ZERO,
            expense_total: Decimal::ZERO,
            taxable_amount: Decimal::ZERO,
            total_tax: Decimal::ZERO,
            additional_total: Decimal::ZERO,
            net_total: Decimal::ZERO,
        }
    }
}

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Pending,
    PartialReceived,
    Received,
    Overdue,
    Cancelled,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::PartialReceived => "partial_received",
            InvoiceStatus::Received => "received",
            InvoiceStatus::Overdue => "overdue",
            InvoiceStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "partial_received" => InvoiceStatus::PartialReceived,
            "received" => InvoiceStatus::Received,
            "overdue" => InvoiceStatus::Overdue,
            "cancelled" => InvoiceStatus::Cancelled,
            _ => InvoiceStatus::Pending,
        }
    }

    /// Recompute after a payment lands.
    pub fn after_payment(outstanding: Decimal) -> Self {
        if outstanding <= Decimal::ZERO {
            InvoiceStatus::Received
        } else {
            InvoiceStatus::PartialReceived
        }
    }
}

/// Payout receipt status (driver salary / transporter payment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptStatus {
    Generated,
    Paid,
    Cancelled,
}

impl ReceiptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReceiptStatus::Generated => "generated",
            ReceiptStatus::Paid => "paid",
            ReceiptStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paid" => ReceiptStatus::Paid,
            "cancelled" => ReceiptStatus::Cancelled,
            _ => ReceiptStatus::Generated,
        }
    }
}

/// Customer invoice document.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub tenant_id: Uuid,
    pub invoice_no: String,
    pub customer_id: Uuid,
    pub customer_name: String,
    pub associated_subtrips: Vec<Uuid>,
    pub subtrip_snapshot: Json<Vec<SubtripSnapshot>>,
    pub tax: Json<TaxBreakup>,
    pub additional_charges: Json<Vec<AdditionalCharge>>,
    pub subtotal: Decimal,
    pub shortage_total: Decimal,
    pub total_tax: Decimal,
    pub additional_total: Decimal,
    pub net_total: Decimal,
    pub total_received: Decimal,
    pub status: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub created_utc: DateTime<Utc>,
    pub cancelled_utc: Option<DateTime<Utc>>,
}

impl Invoice {
    pub fn status(&self) -> InvoiceStatus {
        InvoiceStatus::from_string(&self.status)
    }

    pub fn outstanding(&self) -> Decimal {
        self.net_total - self.total_received
    }
}

/// Partial payment recorded against an invoice.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InvoicePayment {
    pub payment_id: Uuid,
    pub tenant_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub payment_mode: String,
    pub payment_reference: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Payout receipt document, one table each for driver salaries and
/// transporter payments (identical shape, different claim field).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PayoutReceipt {
    pub receipt_id: Uuid,
    pub tenant_id: Uuid,
    pub receipt_no: String,
    pub counterparty_id: Uuid,
    pub counterparty_name: String,
    pub associated_subtrips: Vec<Uuid>,
    pub subtrip_snapshot: Json<Vec<SubtripSnapshot>>,
    pub tax: Json<TaxBreakup>,
    pub additional_charges: Json<Vec<AdditionalCharge>>,
    pub subtotal: Decimal,
    pub shortage_total: Decimal,
    pub expense_total: Decimal,
    pub total_tax: Decimal,
    pub additional_total: Decimal,
    pub net_total: Decimal,
    pub status: String,
    pub paid_date: Option<NaiveDate>,
    pub payment_mode: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub cancelled_utc: Option<DateTime<Utc>>,
}

impl PayoutReceipt {
    pub fn status(&self) -> ReceiptStatus {
        ReceiptStatus::from_string(&self.status)
    }
}

/// Input for creating an invoice.
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub tenant_id: Uuid,
    pub customer_id: Uuid,
    pub subtrip_ids: Vec<Uuid>,
    pub additional_charges: Vec<AdditionalCharge>,
    pub issue_date: NaiveDate,
}

/// Input for creating a payout receipt (driver salary or transporter
/// payment; the counterparty is a driver or transporter respectively).
#[derive(Debug, Clone)]
pub struct CreatePayout {
    pub tenant_id: Uuid,
    pub counterparty_id: Uuid,
    pub subtrip_ids: Vec<Uuid>,
    pub additional_charges: Vec<AdditionalCharge>,
}

/// Filter parameters for listing settlement documents.
#[derive(Debug, Clone, Default)]
pub struct ListSettlementsFilter {
    pub status: Option<String>,
    pub counterparty_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoice_status_recomputes_from_outstanding() {
        assert_eq!(
            InvoiceStatus::after_payment(Decimal::ZERO),
            InvoiceStatus::Received
        );
        assert_eq!(
            InvoiceStatus::after_payment(Decimal::from(100)),
            InvoiceStatus::PartialReceived
        );
    }

    #[test]
    fn statuses_round_trip_through_strings() {
        for status in [
            InvoiceStatus::Pending,
            InvoiceStatus::PartialReceived,
            InvoiceStatus::Received,
            InvoiceStatus::Overdue,
            InvoiceStatus::Cancelled,
        ] {
            assert_eq!(InvoiceStatus::from_string(status.as_str()), status);
        }
        for status in [
            ReceiptStatus::Generated,
            ReceiptStatus::Paid,
            ReceiptStatus::Cancelled,
        ] {
            assert_eq!(ReceiptStatus::from_string(status.as_str()), status);
        }
    }
}
