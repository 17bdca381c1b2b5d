use crate::core::{AppError, Result};
use crate::modules::invoices::services::{InvoiceSettings, NumberFormat};
use serde::Deserialize;
use std::env;
use std::time::Duration;

pub mod database;
pub mod server;

pub use database::DatabaseConfig;
pub use server::ServerConfig;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub invoicing: InvoicingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InvoicingConfig {
    /// Deadline for a single invoice operation
    pub tx_timeout_secs: u64,
    pub number_pattern: String,
    pub counter_width: usize,
}

impl InvoicingConfig {
    pub fn from_env() -> Result<Self> {
        Ok(InvoicingConfig {
            tx_timeout_secs: parse_var("INVOICE_TX_TIMEOUT_SECS", "10")?,
            number_pattern: env::var("INVOICE_NUMBER_PATTERN")
                .unwrap_or_else(|_| "{YYYY}-{COUNTER}".to_string()),
            counter_width: parse_var("INVOICE_COUNTER_WIDTH", "4")?,
        })
    }

    /// Build the settings the invoice service runs with
    pub fn settings(&self) -> Result<InvoiceSettings> {
        Ok(InvoiceSettings {
            number_format: NumberFormat::new(self.number_pattern.clone(), self.counter_width)?,
            tx_timeout: Duration::from_secs(self.tx_timeout_secs),
        })
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let config = Config {
            app: AppConfig {
                env: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
                log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            },
            database: DatabaseConfig::from_env()?,
            server: ServerConfig::from_env()?,
            invoicing: InvoicingConfig::from_env()?,
        };

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.invoicing.tx_timeout_secs == 0 {
            return Err(AppError::Configuration(
                "Invoice transaction timeout must be greater than 0".to_string(),
            ));
        }

        if self.database.pool_size > self.database.max_connections {
            return Err(AppError::Configuration(
                "DATABASE_POOL_SIZE cannot exceed DATABASE_MAX_CONNECTIONS".to_string(),
            ));
        }

        self.invoicing.settings()?;

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| AppError::Configuration(format!("Invalid {}", name)))
}
