//! Request and response DTOs for the HTTP API.

use crate::models::{AdditionalCharge, ExpenseType, MaterialInfo, SubtripPatch};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

fn default_page_size() -> i32 {
    50
}

/// Cursor-paginated list envelope.
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<Uuid>,
}

impl<T> ListResponse<T> {
    /// The cursor comes from the last returned item; a short page means the
    /// listing is exhausted.
    pub fn new(items: Vec<T>, page_size: i32, cursor_of: impl Fn(&T) -> Uuid) -> Self {
        let next_page_token = if items.len() as i32 >= page_size.clamp(1, 100) {
            items.last().map(&cursor_of)
        } else {
            None
        };
        Self {
            items,
            next_page_token,
        }
    }
}

// -----------------------------------------------------------------------------
// Subtrips
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSubtripRequest {
    pub customer_id: Uuid,
    pub vehicle_id: Uuid,
    pub driver_id: Uuid,
    pub route_id: Uuid,
    #[validate(length(min = 1))]
    pub loading_point: String,
    #[validate(length(min = 1))]
    pub unloading_point: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub is_empty: bool,
    pub remarks: Option<String>,
    pub material: Option<MaterialInfo>,
}

#[derive(Debug, Deserialize)]
pub struct SubtripListParams {
    pub status: Option<String>,
    pub customer_id: Option<Uuid>,
    pub vehicle_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResolveErrorRequest {
    #[validate(length(min = 1))]
    pub remarks: String,
}

pub type UpdateSubtripRequest = SubtripPatch;

#[derive(Debug, Deserialize)]
pub struct AddExpenseRequest {
    pub expense_type: ExpenseType,
    pub amount: Decimal,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EventRangeParams {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// Audit event plus its rendered display message.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    #[serde(flatten)]
    pub event: crate::models::SubtripEvent,
    pub message: String,
}

impl From<crate::models::SubtripEvent> for EventResponse {
    fn from(event: crate::models::SubtripEvent) -> Self {
        let message = event.render();
        Self { event, message }
    }
}

// -----------------------------------------------------------------------------
// Invoices
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub customer_id: Uuid,
    pub subtrip_ids: Vec<Uuid>,
    #[serde(default)]
    pub additional_charges: Vec<AdditionalCharge>,
    /// Defaults to today when omitted.
    pub issue_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct BulkCreateInvoicesRequest {
    pub invoices: Vec<CreateInvoiceRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub payment_date: Option<NaiveDate>,
    #[validate(length(min = 1))]
    pub payment_mode: String,
    pub payment_reference: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct MarkOverdueRequest {
    pub as_of: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
pub struct MarkOverdueResponse {
    pub marked: u64,
}

// -----------------------------------------------------------------------------
// Payout receipts
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct CreateDriverSalaryRequest {
    pub driver_id: Uuid,
    pub subtrip_ids: Vec<Uuid>,
    #[serde(default)]
    pub additional_charges: Vec<AdditionalCharge>,
}

#[derive(Debug, Deserialize)]
pub struct BulkCreateDriverSalariesRequest {
    pub receipts: Vec<CreateDriverSalaryRequest>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTransporterPaymentRequest {
    pub transporter_id: Uuid,
    pub subtrip_ids: Vec<Uuid>,
    #[serde(default)]
    pub additional_charges: Vec<AdditionalCharge>,
}

#[derive(Debug, Deserialize)]
pub struct BulkCreateTransporterPaymentsRequest {
    pub receipts: Vec<CreateTransporterPaymentRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct MarkPaidRequest {
    pub paid_date: Option<NaiveDate>,
    #[validate(length(min = 1))]
    pub payment_mode: String,
}

#[derive(Debug, Deserialize)]
pub struct SettlementListParams {
    pub status: Option<String>,
    pub counterparty_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}
