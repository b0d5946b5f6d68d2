//! Business services for settlement-service.

pub mod database;
pub mod metrics;
pub mod settlements;
pub mod tax;

pub use database::Database;
pub use metrics::{get_metrics, init_metrics};
pub use settlements::PayoutKind;
