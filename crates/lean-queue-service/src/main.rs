//! # Lean Queue Service
//!
//! Binary entry point for the Lean Queue HTTP service.
//!
//! This executable:
//! - Loads configuration from files and `LQ__` environment variables
//! - Initializes logging
//! - Connects to PostgreSQL and applies migrations
//! - Serves the queue API under a restart supervisor until SIGINT/SIGTERM

use anyhow::Context;
use clap::Parser;
use lean_queue_api::{
    shutdown_signal, start_server, AppState, ServiceError, ServiceMetrics, StoreHealthChecker,
};
use lean_queue_core::{MessageStore, PostgresMessageStore, QueueService};
use lean_queue_service::{
    exit_code, init_tracing, load_service_config, postgres_options, Args, RestartPolicy,
    Supervisor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logging is configured from the loaded file, so failures before that
    // point go to stderr.
    let config = match load_service_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("lean-queue: {}", e);
            std::process::exit(exit_code(&ServiceError::Configuration(e)));
        }
    };

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    init_tracing(&level, args.json_logs || config.logging.json_format);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting Lean Queue service");

    // -------------------------------------------------------------------------
    // Storage
    // -------------------------------------------------------------------------
    let store = match PostgresMessageStore::connect(&postgres_options(&config.database)).await {
        Ok(store) => store,
        Err(e) => {
            error!(error = %e, "Could not connect to the message database; aborting");
            std::process::exit(exit_code(&ServiceError::Storage(e)));
        }
    };

    if config.database.run_migrations || args.migrate_only {
        if let Err(e) = store.migrate().await {
            error!(error = %e, "Database migration failed; aborting");
            std::process::exit(exit_code(&ServiceError::Storage(e)));
        }
    }

    if args.migrate_only {
        info!("Migrations applied; exiting");
        return Ok(());
    }

    let store: Arc<dyn MessageStore> = Arc::new(store);
    let queue = QueueService::new(store.clone()).with_defaults(config.queue.reservation_defaults());
    let metrics = ServiceMetrics::new().context("failed to register service metrics")?;
    let state = AppState::new(
        config.clone(),
        queue,
        Arc::new(StoreHealthChecker::new(store)),
        metrics,
    );

    // -------------------------------------------------------------------------
    // Serve
    // -------------------------------------------------------------------------
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received; draining in-flight requests");
        let _ = shutdown_tx.send(true);
    });

    let supervisor = Supervisor::new(RestartPolicy::default(), shutdown_rx.clone());
    let server_rx = shutdown_rx.clone();
    let serve = supervisor.run(move || {
        let state = state.clone();
        let mut rx = server_rx.clone();
        async move {
            start_server(state, async move {
                let _ = rx.wait_for(|stop| *stop).await;
            })
            .await
        }
    });

    let drain_timeout = Duration::from_secs(config.server.shutdown_timeout_seconds);
    let mut drain_rx = shutdown_rx;
    let drain_deadline = async move {
        if drain_rx.wait_for(|stop| *stop).await.is_ok() {
            tokio::time::sleep(drain_timeout).await;
        } else {
            std::future::pending::<()>().await;
        }
    };

    let result = tokio::select! {
        result = serve => result,
        _ = drain_deadline => {
            warn!(
                timeout_seconds = config.server.shutdown_timeout_seconds,
                "Graceful shutdown timed out; abandoning in-flight requests"
            );
            Ok(())
        }
    };

    if let Err(e) = result {
        error!(error = %e, "Service stopped with an error");
        std::process::exit(exit_code(&e));
    }

    info!("Lean Queue service stopped");
    Ok(())
}
