//! # Lean Queue Service
//!
//! Process-level wiring for the queue binary: command line arguments,
//! layered configuration loading, logging setup and the supervisor that
//! restarts the HTTP server after unexpected failures.

pub mod bootstrap;
pub mod supervisor;

pub use bootstrap::{exit_code, init_tracing, load_service_config, postgres_options, Args};
pub use supervisor::{RestartPolicy, Supervisor};
