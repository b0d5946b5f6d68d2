//! Data models for settlement-service.

mod event;
mod party;
mod settlement;
mod subtrip;

pub use event::{EventType, SubtripEvent};
pub use party::{
    Customer, Driver, RouteExpenseConfig, TaxProfile, Tenant, Transporter, Trip, Vehicle,
};
pub use settlement::{
    AdditionalCharge, CreateInvoice, CreatePayout, Invoice, InvoicePayment, InvoiceStatus,
    ListSettlementsFilter, PayoutReceipt, ReceiptStatus, SettlementKind, SettlementSummary,
    SubtripSnapshot, TaxBreakup, TaxLine,
};
pub use subtrip::{
    CreateSubtrip, Expense, ExpenseType, FieldChange, ListSubtripsFilter, MaterialInfo,
    ReceiveInfo, Subtrip, SubtripPatch, SubtripStatus,
};
