//! Configuration module for environment variables and application settings

use anyhow::Result;
use once_cell::sync::Lazy;
use std::env;

/// Global application configuration loaded from environment variables
pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    Config::from_env().expect("Failed to load configuration from environment")
});

#[derive(Debug, Clone)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,

    /// Oracle freshness configuration
    pub oracle: OracleConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Maximum accepted age of a price point, in seconds. Executions against
    /// older data are rejected with a stale-price error.
    pub max_stale_price_period: u64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("SERVER_PORT")
                    .unwrap_or_else(|_| "3000".to_string())
                    .parse()
                    .unwrap_or(3000),
            },
            oracle: OracleConfig {
                max_stale_price_period: env::var("MAX_STALE_PRICE_PERIOD")
                    .unwrap_or_else(|_| "3600".to_string())
                    .parse()
                    .unwrap_or(3600),
            },
        })
    }
}
