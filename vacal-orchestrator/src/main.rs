use anyhow::Context;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vacal_runner::{InMemoryJobStore, JobDispatcher, JobStore, RunnerConfig};

pub mod api;
pub mod db;
pub mod repository;

const DEFAULT_CORS_ORIGINS: &str = "http://localhost:5173,http://localhost:5174";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "vacal_orchestrator=debug,vacal_runner=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting VA Calibration Orchestrator...");

    let config = RunnerConfig::from_env().context("Invalid runner configuration")?;
    config.validate().context("Invalid runner configuration")?;

    tracing::info!(
        "Scripts: {}, logs: {}, interpreter: {}, timeout: {:?}",
        config.scripts_dir.display(),
        config.log_dir.display(),
        config.interpreter.display(),
        config.job_timeout
    );

    tokio::fs::create_dir_all(&config.log_dir)
        .await
        .with_context(|| format!("Failed to create log directory {}", config.log_dir.display()))?;

    let store = create_store().await?;
    let shutdown = CancellationToken::new();
    let dispatcher = Arc::new(JobDispatcher::new(config, store, shutdown.clone()));

    let recovered = dispatcher
        .recover_interrupted()
        .await
        .context("Failed to recover interrupted tasks")?;
    if recovered > 0 {
        tracing::warn!("Marked {} interrupted task(s) as errored", recovered);
    }

    let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
        .unwrap_or_else(|_| DEFAULT_CORS_ORIGINS.to_string())
        .split(',')
        .map(|origin| origin.trim().to_string())
        .filter(|origin| !origin.is_empty())
        .collect();

    // Build router with all API endpoints
    let app = api::create_router(dispatcher, &cors_origins);

    // Get bind address
    let addr =
        std::env::var("ORCHESTRATOR_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());

    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown))
        .await
        .context("Server error")?;

    tracing::info!("Orchestrator stopped");
    Ok(())
}

/// Picks the Postgres store when DATABASE_URL is set, otherwise keeps
/// records in memory
async fn create_store() -> anyhow::Result<Arc<dyn JobStore>> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        tracing::info!("DATABASE_URL not set, task records are kept in memory");
        return Ok(Arc::new(InMemoryJobStore::new()));
    };

    tracing::info!("Connecting to database...");

    let pool = db::create_pool(&database_url)
        .await
        .context("Failed to create database pool")?;

    tracing::info!("Database connection pool created");

    db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;

    Ok(Arc::new(repository::PgJobStore::new(pool)))
}

/// Resolves on Ctrl-C and ends open log follows
async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
