use anyhow::Result;
use dotenvy::dotenv;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct SettlementConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Fallback GST rate (percent per CGST/SGST component) when a
    /// counterparty has GST enabled but no configured rate.
    pub default_gst_rate: Decimal,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

impl SettlementConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("SETTLEMENT_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("SETTLEMENT_SERVICE_PORT")
            .unwrap_or_else(|_| "3010".to_string())
            .parse()?;

        let db_url = env::var("SETTLEMENT_DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("SETTLEMENT_DATABASE_URL must be set"))?;
        let max_connections = env::var("SETTLEMENT_DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()?;
        let min_connections = env::var("SETTLEMENT_DATABASE_MIN_CONNECTIONS")
            .unwrap_or_else(|_| "1".to_string())
            .parse()?;

        let default_gst_rate = env::var("SETTLEMENT_DEFAULT_GST_RATE")
            .unwrap_or_else(|_| "6".to_string())
            .parse::<Decimal>()
            .map_err(|e| anyhow::anyhow!("Invalid SETTLEMENT_DEFAULT_GST_RATE: {}", e))?;

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let otlp_endpoint = env::var("OTLP_ENDPOINT").ok().filter(|v| !v.is_empty());

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: db_url,
                max_connections,
                min_connections,
            },
            default_gst_rate,
            service_name: "settlement-service".to_string(),
            log_level,
            otlp_endpoint,
        })
    }
}
