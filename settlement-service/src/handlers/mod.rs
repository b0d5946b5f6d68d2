pub mod invoices;
pub mod payouts;
pub mod subtrips;
