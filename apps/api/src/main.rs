//! Auditrail API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod api_services;
mod dev_seed;
mod dto;
mod error;
mod handlers;
mod middleware;
mod state;

use auditrail_core::AppError;
use tracing::{info, warn};

use crate::api_config::{ApiCommand, ApiConfig, StorageBackend};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    api_config::init_tracing();

    let config = ApiConfig::load()?;

    let runtime = match &config.storage_backend {
        StorageBackend::Postgres { database_url } => {
            let pool = api_services::connect_postgres(database_url.as_str()).await?;
            api_services::run_migrations(&pool).await?;

            match config.command {
                ApiCommand::Migrate => {
                    info!("database migrations applied successfully");
                    return Ok(());
                }
                ApiCommand::Seed => {
                    return api_services::seed_postgres(&pool).await;
                }
                ApiCommand::Serve => {}
            }

            api_services::build_postgres_runtime(&config, pool)?
        }
        StorageBackend::Memory => {
            if config.command == ApiCommand::Seed {
                info!("memory backend is always seeded; nothing to do");
                return Ok(());
            }
            api_services::build_memory_runtime(&config).await?
        }
    };

    let worker_handle = runtime.worker_pool.map(|pool| pool.spawn());
    let app = api_router::build_router(runtime.state, config.frontend_url.as_str())?;

    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(
        %address,
        storage_backend = config.storage_backend_label(),
        embedded_worker = worker_handle.is_some(),
        "auditrail-api listening"
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|error| AppError::Internal(format!("api server error: {error}")));

    if let Some(worker_handle) = worker_handle {
        worker_handle.shutdown().await;
    }

    served
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
