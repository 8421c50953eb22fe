//! Start-up plumbing: arguments, configuration layering and logging.

use clap::Parser;
use lean_queue_api::{ConfigError, DatabaseConfig, ServiceConfig, ServiceError};
use lean_queue_core::PostgresStoreOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// System-wide configuration file, extension resolved by the loader
pub const SYSTEM_CONFIG_PATH: &str = "/etc/lean-queue/service";

/// Deployment-local configuration file relative to the working directory
pub const LOCAL_CONFIG_PATH: &str = "config/service";

/// Prefix for environment overrides, e.g. `LQ__SERVER__PORT=9090`
pub const ENV_PREFIX: &str = "LQ";

/// Command line arguments for the `lean-queue` binary
#[derive(Debug, Clone, Parser)]
#[command(name = "lean-queue", version, about = "Lease-based work queue service")]
pub struct Args {
    /// Explicit configuration file layered over the default locations
    #[arg(long, short = 'c', env = "LQ_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Override the configured log level (e.g. `debug`, `info,sqlx=warn`)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,

    /// Apply database migrations and exit
    #[arg(long)]
    pub migrate_only: bool,
}

/// Load and validate the service configuration
///
/// Sources, later ones overriding earlier ones:
///  1. `/etc/lean-queue/service.{yaml,toml,json}`
///  2. `./config/service.{yaml,toml,json}`
///  3. `explicit`, which must exist when given
///  4. `LQ__`-prefixed environment variables with `__` as the separator
pub fn load_service_config(explicit: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    load_layered_config(&[SYSTEM_CONFIG_PATH, LOCAL_CONFIG_PATH], explicit)
}

/// [`load_service_config`] with the optional base files supplied by the caller
pub fn load_layered_config(
    base_files: &[&str],
    explicit: Option<&Path>,
) -> Result<ServiceConfig, ConfigError> {
    let mut builder = config::Config::builder();

    for base in base_files {
        builder = builder.add_source(config::File::with_name(base).required(false));
    }

    if let Some(path) = explicit {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let loaded = builder
        .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
        .build()
        .map_err(|e| ConfigError::Load {
            message: e.to_string(),
        })?;

    let service_config: ServiceConfig =
        loaded.try_deserialize().map_err(|e| ConfigError::Load {
            message: e.to_string(),
        })?;

    service_config.validate()?;
    Ok(service_config)
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over `level` when set.
pub fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }

    info!(level, json, "Logging initialised");
}

/// Pool settings for the PostgreSQL store
pub fn postgres_options(database: &DatabaseConfig) -> PostgresStoreOptions {
    PostgresStoreOptions {
        url: database.url.clone(),
        max_connections: database.max_connections,
        min_connections: database.min_connections,
        acquire_timeout: Duration::from_secs(database.acquire_timeout_seconds),
        idle_timeout: Duration::from_secs(database.idle_timeout_seconds),
        max_lifetime: Duration::from_secs(database.max_lifetime_seconds),
        statement_timeout: Duration::from_secs(database.statement_timeout_seconds),
    }
}

/// Process exit code for a fatal service error
pub fn exit_code(error: &ServiceError) -> i32 {
    match error {
        ServiceError::BindFailed { .. } => 1,
        ServiceError::ServerFailed { .. } => 2,
        ServiceError::Configuration(_) => 3,
        ServiceError::Storage(_) => 4,
    }
}

#[cfg(test)]
#[path = "bootstrap_tests.rs"]
mod tests;
