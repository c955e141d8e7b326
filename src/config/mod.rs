//! Configuration module for the supplementary billing engine.

use std::env;

use crate::error::BillingError;

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub service_name: String,
    pub log_level: String,
    pub database: DatabaseConfig,
    pub charging_module: ChargingModuleConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct ChargingModuleConfig {
    pub base_url: String,
    pub bearer_token: Option<String>,
    /// Delay between bill run status polls, in milliseconds.
    pub poll_interval_ms: u64,
    /// Maximum number of status polls before giving up on a bill run.
    pub poll_max_attempts: u32,
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, BillingError> {
        dotenvy::dotenv().ok();

        Ok(Self {
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "supplementary-billing".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    BillingError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
                })?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(2),
            },
            charging_module: ChargingModuleConfig {
                base_url: env::var("CHARGING_MODULE_URL").map_err(|_| {
                    BillingError::ConfigError(anyhow::anyhow!("CHARGING_MODULE_URL is required"))
                })?,
                bearer_token: env::var("CHARGING_MODULE_TOKEN").ok(),
                poll_interval_ms: env::var("CHARGING_MODULE_POLL_INTERVAL_MS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(1_000),
                poll_max_attempts: env::var("CHARGING_MODULE_POLL_MAX_ATTEMPTS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(240),
            },
        })
    }
}
