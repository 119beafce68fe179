use std::sync::Arc;

use auditrail_application::{
    ArtifactStore, AuditEventStore, AuditPermissionResolver, AuditQueryService, Clock,
    DownloadTokenRepository, DownloadTokenService, ExportJobRepository, ExportJobService,
    ExportQuotaService, ExportQuotaStore, ExportWorkerPool, MembershipRepository, SystemClock,
};
use auditrail_core::{AppError, AppResult};
use auditrail_infrastructure::{
    FilesystemArtifactStore, InMemoryArtifactStore, InMemoryAuditEventStore,
    InMemoryDownloadTokenRepository, InMemoryExportJobRepository, InMemoryExportQuotaStore,
    InMemoryMembershipRepository, PostgresAuditEventStore, PostgresDownloadTokenRepository,
    PostgresExportJobRepository, PostgresExportQuotaStore, PostgresMembershipRepository,
    RedisExportQuotaStore, default_export_renderers,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::api_config::{ApiConfig, WorkerMode};
use crate::dev_seed;
use crate::state::AppState;

const QUOTA_KEY_PREFIX: &str = "auditrail:export-quota";

/// Ports a backend provides to the services.
struct Adapters {
    events: Arc<dyn AuditEventStore>,
    memberships: Arc<dyn MembershipRepository>,
    jobs: Arc<dyn ExportJobRepository>,
    tokens: Arc<dyn DownloadTokenRepository>,
    artifacts: Arc<dyn ArtifactStore>,
    quota: Arc<dyn ExportQuotaStore>,
}

/// Assembled state plus the worker pool to run next to the server, if any.
pub struct ApiRuntime {
    pub state: AppState,
    pub worker_pool: Option<ExportWorkerPool>,
}

pub async fn connect_postgres(database_url: &str) -> AppResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))
}

pub async fn run_migrations(pool: &PgPool) -> AppResult<()> {
    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))
}

/// Writes the demo memberships and events; existing rows are left in place.
pub async fn seed_postgres(pool: &PgPool) -> AppResult<()> {
    let memberships = PostgresMembershipRepository::new(pool.clone());
    for (user_id, organization_id, role) in dev_seed::memberships() {
        memberships
            .upsert_membership(user_id, organization_id, role)
            .await?;
    }

    let events = PostgresAuditEventStore::new(pool.clone());
    let mut inserted = 0_usize;
    for event in dev_seed::events() {
        if events
            .find_by_id(event.organization_id, event.id)
            .await?
            .is_none()
        {
            events.append(&event).await?;
            inserted += 1;
        }
    }

    info!(
        organization_id = %dev_seed::organization_id(),
        inserted,
        "development seed applied"
    );
    Ok(())
}

/// In-memory backend preloaded with the development seed.
pub async fn build_memory_runtime(config: &ApiConfig) -> AppResult<ApiRuntime> {
    let memberships = Arc::new(InMemoryMembershipRepository::new());
    for (user_id, organization_id, role) in dev_seed::memberships() {
        memberships.set_role(user_id, organization_id, role).await;
    }

    let events = Arc::new(InMemoryAuditEventStore::new());
    for event in dev_seed::events() {
        events.append(event).await?;
    }

    let adapters = Adapters {
        events,
        memberships,
        jobs: Arc::new(InMemoryExportJobRepository::new()),
        tokens: Arc::new(InMemoryDownloadTokenRepository::new()),
        artifacts: Arc::new(InMemoryArtifactStore::new()),
        quota: Arc::new(InMemoryExportQuotaStore::new()),
    };

    Ok(assemble(config, adapters, "memory", None, None))
}

pub fn build_postgres_runtime(config: &ApiConfig, pool: PgPool) -> AppResult<ApiRuntime> {
    let redis_client = config
        .redis_url
        .as_deref()
        .map(redis::Client::open)
        .transpose()
        .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))?;

    let quota: Arc<dyn ExportQuotaStore> = match redis_client.clone() {
        Some(client) => Arc::new(RedisExportQuotaStore::new(client, QUOTA_KEY_PREFIX)),
        None => Arc::new(PostgresExportQuotaStore::new(pool.clone())),
    };

    let adapters = Adapters {
        events: Arc::new(PostgresAuditEventStore::new(pool.clone())),
        memberships: Arc::new(PostgresMembershipRepository::new(pool.clone())),
        jobs: Arc::new(PostgresExportJobRepository::new(pool.clone())),
        tokens: Arc::new(PostgresDownloadTokenRepository::new(pool.clone())),
        artifacts: Arc::new(FilesystemArtifactStore::new(config.storage_path.as_str())),
        quota,
    };

    Ok(assemble(
        config,
        adapters,
        "postgres",
        Some(pool),
        redis_client,
    ))
}

fn assemble(
    config: &ApiConfig,
    adapters: Adapters,
    storage_backend: &'static str,
    postgres_pool: Option<PgPool>,
    redis_client: Option<redis::Client>,
) -> ApiRuntime {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let permission_resolver = AuditPermissionResolver::new(adapters.memberships);
    let audit_query_service = AuditQueryService::new(adapters.events);
    let download_token_service = DownloadTokenService::new(
        adapters.tokens,
        adapters.jobs.clone(),
        adapters.artifacts.clone(),
        clock.clone(),
        config.pipeline.token_ttl(),
    );

    let export_job_service = default_export_renderers().into_iter().fold(
        ExportJobService::new(
            permission_resolver.clone(),
            audit_query_service.clone(),
            ExportQuotaService::new(adapters.quota, config.pipeline.quota_limits()),
            download_token_service.clone(),
            adapters.jobs,
            adapters.artifacts,
            clock,
            config.pipeline.job_settings(),
        ),
        ExportJobService::with_renderer,
    );

    let worker_pool = (config.worker_mode == WorkerMode::Embedded).then(|| {
        ExportWorkerPool::new(
            export_job_service.clone(),
            format!("api-embedded-{}", std::process::id()),
            &config.pipeline,
        )
    });

    ApiRuntime {
        state: AppState {
            permission_resolver,
            audit_query_service,
            export_job_service,
            download_token_service,
            gateway_shared_secret: Arc::from(config.gateway_shared_secret.as_str()),
            storage_backend,
            postgres_pool,
            redis_client,
        },
        worker_pool,
    }
}
