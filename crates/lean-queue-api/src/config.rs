//! Configuration types for the HTTP service

use crate::errors::ConfigError;
use lean_queue_core::ReservationDefaults;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Database connection settings
    pub database: DatabaseConfig,

    /// Reservation defaults and limits
    pub queue: QueueConfig,

    /// Security settings
    pub security: SecurityConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl ServiceConfig {
    /// Check cross-field rules that serde cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "database.url".to_string(),
            });
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid {
                message: "database.max_connections must be greater than zero".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                message: "database.min_connections cannot exceed database.max_connections"
                    .to_string(),
            });
        }

        if self.queue.default_limit == 0 {
            return Err(ConfigError::Invalid {
                message: "queue.default_limit must be greater than zero".to_string(),
            });
        }

        if self.queue.max_limit < self.queue.default_limit {
            return Err(ConfigError::Invalid {
                message: "queue.max_limit cannot be lower than queue.default_limit".to_string(),
            });
        }

        if let Some((name, _)) = self
            .security
            .api_keys
            .iter()
            .find(|(_, key)| key.trim().is_empty())
        {
            return Err(ConfigError::Invalid {
                message: format!("security.api_keys.{} must not be blank", name),
            });
        }

        if self.security.api_key_header.trim().is_empty() {
            return Err(ConfigError::Missing {
                key: "security.api_key_header".to_string(),
            });
        }

        let prefix = &self.server.path_prefix;
        if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
            return Err(ConfigError::Invalid {
                message: format!(
                    "server.path_prefix '{}' must start with '/' and not end with '/'",
                    prefix
                ),
            });
        }

        Ok(())
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Prefix for the message routes, e.g. `/v1`; empty mounts them at the root
    pub path_prefix: String,

    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout_seconds: u64,

    /// Maximum request size in bytes
    pub max_body_size: usize,

    /// Enable CORS
    pub enable_cors: bool,

    /// Enable compression
    pub enable_compression: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            path_prefix: String::new(),
            shutdown_timeout_seconds: 30,
            max_body_size: 1024 * 1024, // 1MB
            enable_cors: true,
            enable_compression: true,
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL connection URL
    pub url: String,

    pub max_connections: u32,

    pub min_connections: u32,

    /// Seconds to wait for a pooled connection
    pub acquire_timeout_seconds: u64,

    pub idle_timeout_seconds: u64,

    /// Maximum lifetime of a pooled connection in seconds
    pub max_lifetime_seconds: u64,

    /// Server-side statement timeout in seconds
    pub statement_timeout_seconds: u64,

    /// Apply pending migrations at startup
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 25,
            min_connections: 5,
            acquire_timeout_seconds: 5,
            idle_timeout_seconds: 600,
            max_lifetime_seconds: 300,
            statement_timeout_seconds: 30,
            run_migrations: true,
        }
    }
}

/// Reservation defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Batch size when the caller sends no limit
    pub default_limit: u32,

    /// Largest batch a single request may claim
    pub max_limit: u32,

    /// Lease length when the caller sends no `reserve_by_seconds`
    pub default_lease_seconds: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            default_limit: 1,
            max_limit: 1000,
            default_lease_seconds: 60,
        }
    }
}

impl QueueConfig {
    pub fn reservation_defaults(&self) -> ReservationDefaults {
        ReservationDefaults {
            default_limit: self.default_limit,
            max_limit: self.max_limit,
            default_lease: Duration::from_secs(self.default_lease_seconds),
        }
    }
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Client name to API key; an empty map disables authentication
    pub api_keys: HashMap<String, String>,

    /// Header carrying the API key
    pub api_key_header: String,

    /// Enable request logging
    pub log_requests: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            api_keys: HashMap::new(),
            api_key_header: "ApiAuthorization".to_string(),
            log_requests: true,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
