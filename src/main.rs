//! JobHub Server — background job dispatch tier
//!
//! Main entry point that wires all crates together and starts the server:
//! the job store, the per-category worker pools, the stale-claim reaper,
//! and the HTTP API for submission, status, and health probes.

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt};

use jobhub_core::config::AppConfig;
use jobhub_core::error::AppError;
use jobhub_core::registry::CategoryRegistry;
use jobhub_store::{JobStore, StoreManager};
use jobhub_worker::{HealthReporter, HealthTracker, JobExecutor, StaleClaimReaper, WorkerRunner};

#[tokio::main]
async fn main() {
    let env = std::env::var("JOBHUB_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

/// Main server run function
async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!("Starting JobHub v{}", env!("CARGO_PKG_VERSION"));

    // ── Step 1: Category registry ────────────────────────────────
    let registry = Arc::new(CategoryRegistry::from_config(&config.worker)?);
    if registry.is_empty() {
        tracing::warn!("No job categories configured");
    }

    // ── Step 2: Job store ────────────────────────────────────────
    let store = Arc::new(StoreManager::new(&config.store, Arc::clone(&registry)).await?);
    let job_store: Arc<dyn JobStore> = store.clone();

    // ── Step 3: Health reporting ─────────────────────────────────
    let tracker = Arc::new(HealthTracker::new());
    let health = Arc::new(HealthReporter::new(
        Arc::clone(&job_store),
        Arc::clone(&registry),
        Arc::clone(&tracker),
    ));

    // ── Step 4: Shutdown channel ─────────────────────────────────
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Step 5: Worker pools ─────────────────────────────────────
    // Job handlers are registered by the embedding deployment before the
    // runner starts; categories without a handler stay not-ready and are
    // served by other worker instances.
    let worker_handle = if config.worker.enabled {
        let executor = Arc::new(JobExecutor::new());
        let runner = WorkerRunner::new(
            Arc::clone(&registry),
            Arc::clone(&job_store),
            executor,
            Arc::clone(&tracker),
            &config.worker,
        );
        let worker_shutdown = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            runner.run(worker_shutdown).await;
        }))
    } else {
        tracing::info!("Worker tier disabled");
        None
    };

    // ── Step 6: Stale-claim reaper ───────────────────────────────
    let reaper = StaleClaimReaper::new(
        Arc::clone(&registry),
        Arc::clone(&job_store),
        std::time::Duration::from_secs(config.worker.reaper_interval_seconds),
    );
    let reaper_shutdown = shutdown_rx.clone();
    let reaper_handle = tokio::spawn(async move {
        reaper.run(reaper_shutdown).await;
    });

    // ── Step 7: HTTP server ──────────────────────────────────────
    let app_state = jobhub_api::AppState {
        config: Arc::new(config.clone()),
        store: Arc::clone(&store),
        registry: Arc::clone(&registry),
        health: Arc::clone(&health),
    };
    let app = jobhub_api::build_router(app_state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    tracing::info!("JobHub server listening on {addr}");

    // ── Step 8: Graceful shutdown ────────────────────────────────
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        tracing::info!("Shutdown signal received, starting graceful shutdown...");
        let _ = shutdown_tx.send(true);
    });

    server
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    // ── Step 9: Wait for background tasks ────────────────────────
    tracing::info!("Waiting for background tasks to complete...");

    let grace = std::time::Duration::from_secs(config.worker.shutdown_grace_seconds + 5);
    if let Some(handle) = worker_handle {
        let _ = tokio::time::timeout(grace, handle).await;
    }
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), reaper_handle).await;

    tracing::info!("JobHub server shut down gracefully");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
