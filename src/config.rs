//! Configuration management for the suiren points service
//!
//! Configuration is loaded from TOML files and environment variables.
//!
//! # Example Configuration File
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0:3000"
//! enable_cors = true
//!
//! [database]
//! path = "data/suiren.db"
//!
//! [paypay]
//! enabled = true
//! app_url = "https://suiren.example.com"
//! link_expiry_minutes = 60
//!
//! [logging]
//! level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// PayPay deep-link configuration
    #[serde(default)]
    pub paypay: PayPayConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to bind the API server to
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            enable_cors: true,
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_true() -> bool {
    true
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file path, or ":memory:" for an in-memory store
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Data directory that relative database paths resolve against
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_database_path() -> String {
    "suiren.db".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

/// PayPay deep-link configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayPayConfig {
    /// Whether payment-link creation is available
    #[serde(default)]
    pub enabled: bool,

    /// Public base URL of this app, embedded in seller QR codes
    #[serde(default = "default_app_url")]
    pub app_url: String,

    /// Minutes before an unconfirmed payment correlation is purged
    #[serde(default = "default_link_expiry_minutes")]
    pub link_expiry_minutes: u64,
}

impl Default for PayPayConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            app_url: default_app_url(),
            link_expiry_minutes: default_link_expiry_minutes(),
        }
    }
}

fn default_app_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_link_expiry_minutes() -> u64 {
    60
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Resolve the database path, making it relative to data_dir if needed
    pub fn resolve_database_path(&self) -> String {
        let path = &self.database.path;

        if path == ":memory:" {
            return path.clone();
        }

        if std::path::Path::new(path).is_absolute() {
            return path.clone();
        }

        self.database.data_dir.join(path).display().to_string()
    }

    /// Get the API bind address
    pub fn bind_address(&self) -> String {
        self.server.bind_address.clone()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.server.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "Invalid bind address: {}",
                self.server.bind_address
            ));
        }

        if self.database.path.is_empty() {
            return Err("Database path cannot be empty".to_string());
        }

        if self.paypay.link_expiry_minutes == 0 {
            return Err("Payment link expiry must be at least 1 minute".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {:?}",
                self.logging.level, valid_levels
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_config() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.server.bind_address = "not-an-address".to_string();
        assert!(config.validate().is_err());

        config.server.bind_address = default_bind_address();
        config.paypay.link_expiry_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_resolve_database_path() {
        let mut config = Config::default();
        assert_eq!(config.resolve_database_path(), "./data/suiren.db");

        config.database.path = ":memory:".to_string();
        assert_eq!(config.resolve_database_path(), ":memory:");

        config.database.path = "/var/lib/suiren/suiren.db".to_string();
        assert_eq!(config.resolve_database_path(), "/var/lib/suiren/suiren.db");
    }

    #[test]
    fn test_parse_example_config() {
        let toml_str = r#"
            [server]
            bind_address = "0.0.0.0:3000"

            [paypay]
            enabled = true
            app_url = "https://suiren.example.com"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert!(config.paypay.enabled);
        assert_eq!(config.server.bind_address, "0.0.0.0:3000");
        assert_eq!(config.logging.level, "info");
    }
}
