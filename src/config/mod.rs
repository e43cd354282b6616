//! Configuration module for the CRM backend.
//!
//! All configuration is loaded from environment variables (and an optional `.env` file) with
//! sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Invalid configuration value.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var} value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// User the data store signs in as at start-up
    pub service_user: String,
    /// Buffered change events per table before slow subscribers lag
    pub feed_capacity: usize,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("CRM_API_PSK").ok().filter(|k| !k.is_empty());

        let db_path = env::var("CRM_DB_PATH")
            .unwrap_or_else(|_| "./data/crm.sqlite".to_string())
            .into();

        let bind_addr = parse_var("CRM_BIND_ADDR", "127.0.0.1:8080")?;

        let log_level = env::var("CRM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let service_user = env::var("CRM_SERVICE_USER").unwrap_or_else(|_| "service".to_string());

        let feed_capacity: usize = parse_var("CRM_FEED_CAPACITY", "64")?;
        if feed_capacity == 0 {
            return Err(ConfigError::Invalid {
                var: "CRM_FEED_CAPACITY",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        Ok(Self {
            api_psk,
            db_path,
            bind_addr,
            log_level,
            service_user,
            feed_capacity,
        })
    }
}

fn parse_var<T>(var: &'static str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let value = env::var(var).unwrap_or_else(|_| default.to_string());
    value.parse().map_err(|err: T::Err| ConfigError::Invalid {
        var,
        reason: err.to_string(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 6] = [
        "CRM_API_PSK",
        "CRM_DB_PATH",
        "CRM_BIND_ADDR",
        "CRM_LOG_LEVEL",
        "CRM_SERVICE_USER",
        "CRM_FEED_CAPACITY",
    ];

    // Environment variables are process-wide, so both cases run in one test.
    #[test]
    fn test_config_from_env() {
        for var in VARS {
            env::remove_var(var);
        }

        let config = Config::from_env().unwrap();

        assert!(config.api_psk.is_none());
        assert_eq!(config.db_path, PathBuf::from("./data/crm.sqlite"));
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.service_user, "service");
        assert_eq!(config.feed_capacity, 64);

        env::set_var("CRM_BIND_ADDR", "not-an-address");
        let err = Config::from_env().unwrap_err();
        assert!(err.to_string().contains("CRM_BIND_ADDR"));

        env::set_var("CRM_BIND_ADDR", "0.0.0.0:9000");
        env::set_var("CRM_FEED_CAPACITY", "0");
        assert!(Config::from_env().is_err());

        env::set_var("CRM_FEED_CAPACITY", "128");
        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.feed_capacity, 128);

        for var in VARS {
            env::remove_var(var);
        }
    }
}
