//! Tests for start-up plumbing.

use super::*;
use lean_queue_core::QueueError;
use serial_test::serial;
use std::io::Write;

const NO_BASE_FILES: &[&str] = &[];

fn write_config(contents: &str, extension: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(extension)
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

fn clear_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with("LQ__") {
            std::env::remove_var(key);
        }
    }
}

// ============================================================================
// Layered loading
// ============================================================================

/// Verify that an explicit YAML file is loaded over the built-in defaults.
#[test]
#[serial]
fn test_explicit_yaml_file_is_loaded() {
    clear_env();
    let file = write_config(
        "database:\n  url: postgres://localhost/queue\nserver:\n  port: 9191\nqueue:\n  default_lease_seconds: 15\n",
        ".yaml",
    );

    let config = load_layered_config(NO_BASE_FILES, Some(file.path())).expect("config loads");

    assert_eq!(config.database.url, "postgres://localhost/queue");
    assert_eq!(config.server.port, 9191);
    assert_eq!(config.queue.default_lease_seconds, 15);
    assert_eq!(config.queue.default_limit, 1);
    assert_eq!(config.server.host, "0.0.0.0");
}

/// Verify that TOML files are accepted based on their extension.
#[test]
#[serial]
fn test_explicit_toml_file_is_loaded() {
    clear_env();
    let file = write_config(
        "[database]\nurl = \"postgres://db/queue\"\n\n[security.api_keys]\nbilling = \"secret\"\n",
        ".toml",
    );

    let config = load_layered_config(NO_BASE_FILES, Some(file.path())).expect("config loads");

    assert_eq!(config.database.url, "postgres://db/queue");
    assert_eq!(
        config.security.api_keys.get("billing").map(String::as_str),
        Some("secret")
    );
}

/// Verify that environment variables override file values.
#[test]
#[serial]
fn test_environment_overrides_file() {
    clear_env();
    let file = write_config(
        "database:\n  url: postgres://file/queue\nserver:\n  port: 9191\n",
        ".yaml",
    );
    std::env::set_var("LQ__SERVER__PORT", "7070");
    std::env::set_var("LQ__QUEUE__MAX_LIMIT", "50");

    let result = load_layered_config(NO_BASE_FILES, Some(file.path()));
    clear_env();

    let config = result.expect("config loads");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.queue.max_limit, 50);
    assert_eq!(config.database.url, "postgres://file/queue");
}

/// Verify that environment variables alone can configure the service.
#[test]
#[serial]
fn test_environment_only_configuration() {
    clear_env();
    std::env::set_var("LQ__DATABASE__URL", "postgres://env/queue");

    let result = load_layered_config(NO_BASE_FILES, None);
    clear_env();

    assert_eq!(result.expect("config loads").database.url, "postgres://env/queue");
}

/// Verify that a missing explicit file is a load error.
#[test]
#[serial]
fn test_missing_explicit_file_fails() {
    clear_env();
    let dir = tempfile::tempdir().expect("temp dir");
    let missing = dir.path().join("absent.yaml");

    let result = load_layered_config(NO_BASE_FILES, Some(&missing));

    assert!(matches!(result, Err(ConfigError::Load { .. })));
}

/// Verify that missing optional base files are skipped.
#[test]
#[serial]
fn test_missing_base_files_are_optional() {
    clear_env();
    let dir = tempfile::tempdir().expect("temp dir");
    let base = dir.path().join("service");
    let base = base.to_string_lossy().to_string();
    std::env::set_var("LQ__DATABASE__URL", "postgres://env/queue");

    let result = load_layered_config(&[base.as_str()], None);
    clear_env();

    assert!(result.is_ok());
}

/// Verify that the loaded configuration is validated.
#[test]
#[serial]
fn test_loaded_configuration_is_validated() {
    clear_env();
    let file = write_config("server:\n  port: 9191\n", ".yaml");

    let result = load_layered_config(NO_BASE_FILES, Some(file.path()));

    assert!(matches!(result, Err(ConfigError::Missing { key }) if key == "database.url"));
}

/// Verify that a value of the wrong type is a load error.
#[test]
#[serial]
fn test_malformed_value_fails() {
    clear_env();
    let file = write_config(
        "database:\n  url: postgres://localhost/queue\nserver:\n  port: not-a-port\n",
        ".yaml",
    );

    let result = load_layered_config(NO_BASE_FILES, Some(file.path()));

    assert!(matches!(result, Err(ConfigError::Load { .. })));
}

// ============================================================================
// Arguments
// ============================================================================

/// Verify argument parsing for all flags.
#[test]
#[serial]
fn test_args_parse_flags() {
    std::env::remove_var("LQ_CONFIG_FILE");

    let args = Args::try_parse_from([
        "lean-queue",
        "--config",
        "/tmp/service.yaml",
        "--log-level",
        "debug",
        "--json-logs",
        "--migrate-only",
    ])
    .expect("arguments parse");

    assert_eq!(args.config, Some(PathBuf::from("/tmp/service.yaml")));
    assert_eq!(args.log_level.as_deref(), Some("debug"));
    assert!(args.json_logs);
    assert!(args.migrate_only);
}

/// Verify that the config path can come from the environment.
#[test]
#[serial]
fn test_args_config_from_environment() {
    std::env::set_var("LQ_CONFIG_FILE", "/srv/lean-queue.yaml");

    let args = Args::try_parse_from(["lean-queue"]);
    std::env::remove_var("LQ_CONFIG_FILE");

    let args = args.expect("arguments parse");
    assert_eq!(args.config, Some(PathBuf::from("/srv/lean-queue.yaml")));
    assert!(!args.migrate_only);
}

// ============================================================================
// Mapping helpers
// ============================================================================

/// Verify that database settings map onto pool options.
#[test]
fn test_postgres_options_mapping() {
    let database = DatabaseConfig {
        url: "postgres://localhost/queue".to_string(),
        max_connections: 10,
        min_connections: 2,
        acquire_timeout_seconds: 3,
        idle_timeout_seconds: 60,
        max_lifetime_seconds: 120,
        statement_timeout_seconds: 9,
        run_migrations: false,
    };

    let options = postgres_options(&database);

    assert_eq!(options.url, "postgres://localhost/queue");
    assert_eq!(options.max_connections, 10);
    assert_eq!(options.min_connections, 2);
    assert_eq!(options.acquire_timeout, Duration::from_secs(3));
    assert_eq!(options.idle_timeout, Duration::from_secs(60));
    assert_eq!(options.max_lifetime, Duration::from_secs(120));
    assert_eq!(options.statement_timeout, Duration::from_secs(9));
}

/// Verify process exit codes per error kind.
#[test]
fn test_exit_codes() {
    assert_eq!(
        exit_code(&ServiceError::BindFailed {
            address: "0.0.0.0:80".to_string(),
            message: "denied".to_string(),
        }),
        1
    );
    assert_eq!(
        exit_code(&ServiceError::ServerFailed {
            message: "boom".to_string(),
        }),
        2
    );
    assert_eq!(
        exit_code(&ServiceError::Configuration(ConfigError::Missing {
            key: "database.url".to_string(),
        })),
        3
    );
    assert_eq!(
        exit_code(&ServiceError::Storage(QueueError::storage("down"))),
        4
    );
}
