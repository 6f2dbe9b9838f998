//! Configuration module for installment-service.

use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

use crate::services::balance::{FineBase, FinePolicy};

#[derive(Debug, Clone)]
pub struct InstallmentConfig {
    pub common: core_config::Config,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub database: DatabaseConfig,
    pub fine_policy: FinePolicy,
    pub aggregator: AggregatorConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Bound on concurrent per-account refreshes in a batch run.
    pub refresh_concurrency: usize,
}

impl InstallmentConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;

        let percentage_base = match env::var("FINE_PERCENTAGE_BASE").as_deref() {
            Ok("pre_balance") => FineBase::PreBalance,
            Ok("install_charge") | Err(_) => FineBase::InstallCharge,
            Ok(other) => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "FINE_PERCENTAGE_BASE must be 'install_charge' or 'pre_balance', got '{}'",
                    other
                )));
            }
        };

        let include_fines_in_outstanding = env::var("OUTSTANDING_INCLUDE_FINES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        Ok(Self {
            common,
            service_name: env::var("SERVICE_NAME")
                .unwrap_or_else(|_| "installment-service".to_string()),
            service_version: env::var("SERVICE_VERSION")
                .unwrap_or_else(|_| env!("CARGO_PKG_VERSION").to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            otlp_endpoint: env::var("OTLP_ENDPOINT").ok(),
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").map_err(|_| {
                    AppError::ConfigError(anyhow::anyhow!("DATABASE_URL is required"))
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
            fine_policy: FinePolicy {
                percentage_base,
                include_fines_in_outstanding,
            },
            aggregator: AggregatorConfig {
                refresh_concurrency: env::var("REFRESH_CONCURRENCY")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8),
            },
        })
    }
}
