//! Settlement service: subtrip lifecycle, settlement documents and the
//! audit trail for multi-tenant logistics operations.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
