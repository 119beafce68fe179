use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use auditrail_application::ExportJobRepository;
use auditrail_core::{AppError, AppResult, OrganizationId, UserId};
use auditrail_domain::{
    AuditLogFilter, ExportArtifactInfo, ExportFormat, ExportJob, ExportJobId, ExportJobStatus,
};

mod lifecycle;
mod maintenance;


const JOB_COLUMNS: &str = r#"
    id,
    organization_id,
    user_id,
    format,
    status,
    filter,
    created_at,
    claimed_by,
    started_at,
    completed_at,
    failure_reason,
    artifact_location,
    artifact_size_bytes,
    record_count,
    download_token,
    download_expires_at
"#;

/// PostgreSQL-backed export job table.
///
/// Claims use `FOR UPDATE SKIP LOCKED`; terminal transitions are conditional
/// updates, so exactly one caller wins each of them.
#[derive(Clone)]
pub struct PostgresExportJobRepository {
    pool: PgPool,
}

impl PostgresExportJobRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Maps a missed conditional update to `NotFound` or `Conflict`.
    async fn transition_error(&self, job_id: ExportJobId, expected: &str) -> AppError {
        match self.find_job(job_id).await {
            Ok(None) => AppError::NotFound(format!("export job '{job_id}' not found")),
            Ok(Some(job)) => AppError::Conflict(format!(
                "export job '{job_id}' is {} and cannot {expected}",
                job.status
            )),
            Err(error) => error,
        }
    }
}

#[derive(Debug, FromRow)]
struct ExportJobRow {
    id: Uuid,
    organization_id: Uuid,
    user_id: Uuid,
    format: String,
    status: String,
    filter: Json<AuditLogFilter>,
    created_at: DateTime<Utc>,
    claimed_by: Option<String>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    failure_reason: Option<String>,
    artifact_location: Option<String>,
    artifact_size_bytes: Option<i64>,
    record_count: Option<i64>,
    download_token: Option<String>,
    download_expires_at: Option<DateTime<Utc>>,
}

impl TryFrom<ExportJobRow> for ExportJob {
    type Error = AppError;

    fn try_from(row: ExportJobRow) -> Result<Self, Self::Error> {
        let format = row.format.parse::<ExportFormat>().map_err(|error| {
            AppError::Internal(format!("corrupt export job '{}': {error}", row.id))
        })?;
        let status = row.status.parse::<ExportJobStatus>().map_err(|error| {
            AppError::Internal(format!("corrupt export job '{}': {error}", row.id))
        })?;
        let artifact = row.artifact_location.map(|location| ExportArtifactInfo {
            location,
            size_bytes: row
                .artifact_size_bytes
                .and_then(|size| u64::try_from(size).ok())
                .unwrap_or_default(),
            record_count: row
                .record_count
                .and_then(|count| u64::try_from(count).ok())
                .unwrap_or_default(),
        });

        Ok(Self {
            id: ExportJobId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            organization_id: OrganizationId::from_uuid(row.organization_id),
            filter: row.filter.0,
            format,
            status,
            created_at: row.created_at,
            claimed_by: row.claimed_by,
            started_at: row.started_at,
            completed_at: row.completed_at,
            failure_reason: row.failure_reason,
            artifact,
            download_token: row.download_token,
            download_expires_at: row.download_expires_at,
        })
    }
}

fn jobs_from_rows(rows: Vec<ExportJobRow>) -> AppResult<Vec<ExportJob>> {
    rows.into_iter().map(ExportJob::try_from).collect()
}

fn sql_limit(limit: usize) -> AppResult<i64> {
    i64::try_from(limit)
        .map_err(|error| AppError::Validation(format!("invalid export job limit: {error}")))
}

#[async_trait]
impl ExportJobRepository for PostgresExportJobRepository {
    async fn create_job(&self, job: ExportJob) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_export_jobs (
                id,
                organization_id,
                user_id,
                format,
                status,
                filter,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id.as_uuid())
        .bind(job.organization_id.as_uuid())
        .bind(job.user_id.as_uuid())
        .bind(job.format.as_str())
        .bind(job.status.as_str())
        .bind(Json(&job.filter))
        .bind(job.created_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to create export job '{}': {error}", job.id))
        })?;

        Ok(())
    }

    async fn find_job(&self, job_id: ExportJobId) -> AppResult<Option<ExportJob>> {
        let statement = format!("SELECT {JOB_COLUMNS} FROM audit_export_jobs WHERE id = $1");
        let row = sqlx::query_as::<_, ExportJobRow>(statement.as_str())
            .bind(job_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to load export job '{job_id}': {error}"))
            })?;

        row.map(ExportJob::try_from).transpose()
    }

    async fn list_jobs_for_user(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<ExportJob>> {
        let statement = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM audit_export_jobs
            WHERE organization_id = $1
              AND user_id = $2
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#
        );
        let rows = sqlx::query_as::<_, ExportJobRow>(statement.as_str())
            .bind(organization_id.as_uuid())
            .bind(user_id.as_uuid())
            .bind(sql_limit(limit)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to list export jobs: {error}"))
            })?;

        jobs_from_rows(rows)
    }

    async fn claim_next_pending(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ExportJob>> {
        self.claim_next_pending_impl(worker_id, now).await
    }

    async fn complete_job(
        &self,
        job_id: ExportJobId,
        worker_id: &str,
        artifact: &ExportArtifactInfo,
        download_token: &str,
        download_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<ExportJob> {
        self.complete_job_impl(
            job_id,
            worker_id,
            artifact,
            download_token,
            download_expires_at,
            now,
        )
        .await
    }

    async fn fail_job(
        &self,
        job_id: ExportJobId,
        worker_id: Option<&str>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<ExportJob> {
        self.fail_job_impl(job_id, worker_id, reason, now).await
    }

    async fn list_stalled_jobs(
        &self,
        started_before: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExportJob>> {
        self.list_stalled_jobs_impl(started_before, limit).await
    }

    async fn list_purgeable_jobs(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExportJob>> {
        self.list_purgeable_jobs_impl(cutoff, limit).await
    }

    async fn delete_job(&self, job_id: ExportJobId) -> AppResult<()> {
        self.delete_job_impl(job_id).await
    }
}
