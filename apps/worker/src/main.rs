//! Auditrail export worker runtime.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;

use auditrail_application::{
    AuditPermissionResolver, AuditQueryService, Clock, DownloadTokenService, ExportJobRepository,
    ExportJobService, ExportPipelineConfig, ExportQuotaService, ExportQuotaStore,
    ExportWorkerPool, SystemClock,
};
use auditrail_core::{AppError, AppResult};
use auditrail_infrastructure::{
    FilesystemArtifactStore, PostgresAuditEventStore, PostgresDownloadTokenRepository,
    PostgresExportJobRepository, PostgresExportQuotaStore, PostgresMembershipRepository,
    RedisExportQuotaStore, default_export_renderers,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const QUOTA_KEY_PREFIX: &str = "auditrail:export-quota";

#[derive(Debug, Clone)]
struct WorkerConfig {
    database_url: String,
    redis_url: Option<String>,
    worker_id: String,
    storage_path: String,
    pipeline: ExportPipelineConfig,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let pool = connect_pool(config.database_url.as_str()).await?;
    let service = build_export_job_service(pool, &config)?;

    info!(
        worker_id = %config.worker_id,
        storage_path = %config.storage_path,
        worker_concurrency = config.pipeline.worker_concurrency,
        poll_interval_ms = config.pipeline.poll_interval_ms,
        quota_backend = if config.redis_url.is_some() { "redis" } else { "postgres" },
        "auditrail-worker started"
    );

    let pool_handle =
        ExportWorkerPool::new(service, config.worker_id.as_str(), &config.pipeline).spawn();

    if let Err(error) = tokio::signal::ctrl_c().await {
        warn!(error = %error, "failed to listen for shutdown signal");
    }

    info!(worker_id = %config.worker_id, "shutting down; waiting for in-flight exports");
    pool_handle.shutdown().await;

    Ok(())
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

fn build_export_job_service(pool: PgPool, config: &WorkerConfig) -> AppResult<ExportJobService> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let jobs: Arc<dyn ExportJobRepository> =
        Arc::new(PostgresExportJobRepository::new(pool.clone()));
    let artifacts = Arc::new(FilesystemArtifactStore::new(config.storage_path.as_str()));
    let quota_store: Arc<dyn ExportQuotaStore> = match config.redis_url.as_deref() {
        Some(redis_url) => {
            let client = redis::Client::open(redis_url)
                .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;
            Arc::new(RedisExportQuotaStore::new(client, QUOTA_KEY_PREFIX))
        }
        None => Arc::new(PostgresExportQuotaStore::new(pool.clone())),
    };

    let token_service = DownloadTokenService::new(
        Arc::new(PostgresDownloadTokenRepository::new(pool.clone())),
        jobs.clone(),
        artifacts.clone(),
        clock.clone(),
        config.pipeline.token_ttl(),
    );

    let service = ExportJobService::new(
        AuditPermissionResolver::new(Arc::new(PostgresMembershipRepository::new(pool.clone()))),
        AuditQueryService::new(Arc::new(PostgresAuditEventStore::new(pool))),
        ExportQuotaService::new(quota_store, config.pipeline.quota_limits()),
        token_service,
        jobs,
        artifacts,
        clock,
        config.pipeline.job_settings(),
    );

    Ok(default_export_renderers()
        .into_iter()
        .fold(service, ExportJobService::with_renderer))
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let database_url = required_env("DATABASE_URL")?;
        let redis_url = optional_env("REDIS_URL");
        let worker_id = optional_env("WORKER_ID")
            .unwrap_or_else(|| format!("export-worker-{}", std::process::id()));
        let storage_path =
            optional_env("EXPORT_STORAGE_PATH").unwrap_or_else(|| "./exports".to_owned());
        let pipeline = ExportPipelineConfig::from_lookup(|name| env::var(name).ok())?;

        Ok(Self {
            database_url,
            redis_url,
            worker_id,
            storage_path,
            pipeline,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> AppResult<String> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}
