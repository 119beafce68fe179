use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use auditrail_application::{DownloadTokenRecord, DownloadTokenRepository};
use auditrail_core::{AppError, AppResult};
use auditrail_domain::ExportJobId;

/// PostgreSQL-backed download token hashes.
#[derive(Clone)]
pub struct PostgresDownloadTokenRepository {
    pool: PgPool,
}

impl PostgresDownloadTokenRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DownloadTokenRepository for PostgresDownloadTokenRepository {
    async fn create_token(&self, record: DownloadTokenRecord) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_download_tokens (
                token_hash,
                job_id,
                issued_at,
                expires_at,
                consumed_at
            )
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(record.token_hash.as_str())
        .bind(record.job_id.as_uuid())
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.consumed_at)
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to store download token for job '{}': {error}",
                record.job_id
            ))
        })?;

        Ok(())
    }

    async fn consume_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ExportJobId>> {
        let job_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE audit_download_tokens
            SET consumed_at = $2
            WHERE token_hash = $1
              AND consumed_at IS NULL
              AND expires_at > $2
            RETURNING job_id
            "#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to consume download token: {error}"))
        })?;

        Ok(job_id.map(ExportJobId::from_uuid))
    }

    async fn delete_tokens_for_job(&self, job_id: ExportJobId) -> AppResult<()> {
        sqlx::query("DELETE FROM audit_download_tokens WHERE job_id = $1")
            .bind(job_id.as_uuid())
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to delete download tokens for job '{job_id}': {error}"
                ))
            })?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use auditrail_application::{
        DownloadTokenRecord, DownloadTokenRepository, ExportJobRepository,
    };
    use auditrail_core::{OrganizationId, UserId};
    use auditrail_domain::{AuditLogFilter, ExportFormat, ExportJob, ExportJobId};

    use super::PostgresDownloadTokenRepository;
    use crate::PostgresExportJobRepository;
    use crate::postgres_test_support::test_pool;

    #[tokio::test]
    async fn token_is_consumed_once_and_only_before_expiry() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let jobs = PostgresExportJobRepository::new(pool.clone());
        let tokens = PostgresDownloadTokenRepository::new(pool);
        let now = Utc::now();
        let job = ExportJob::new(
            ExportJobId::new(),
            UserId::new(),
            OrganizationId::new(),
            AuditLogFilter::default(),
            ExportFormat::Json,
            now,
        );
        assert!(jobs.create_job(job.clone()).await.is_ok());

        for (hash, expires_at) in [
            (format!("live-{}", job.id), now + Duration::hours(1)),
            (format!("stale-{}", job.id), now - Duration::seconds(1)),
        ] {
            let record = DownloadTokenRecord {
                job_id: job.id,
                token_hash: hash,
                issued_at: now - Duration::hours(2),
                expires_at,
                consumed_at: None,
            };
            assert!(tokens.create_token(record).await.is_ok());
        }

        let live = format!("live-{}", job.id);
        let first = tokens.consume_token(live.as_str(), now).await;
        let second = tokens.consume_token(live.as_str(), now).await;
        let stale = tokens
            .consume_token(format!("stale-{}", job.id).as_str(), now)
            .await;

        assert!(first.is_ok_and(|job_id| job_id == Some(job.id)));
        assert!(second.is_ok_and(|job_id| job_id.is_none()));
        assert!(stale.is_ok_and(|job_id| job_id.is_none()));

        assert!(tokens.delete_tokens_for_job(job.id).await.is_ok());
    }
}
