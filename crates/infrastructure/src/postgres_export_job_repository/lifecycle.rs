use super::*;

impl PostgresExportJobRepository {
    pub(super) async fn claim_next_pending_impl(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ExportJob>> {
        let statement = format!(
            r#"
            WITH candidate AS (
                SELECT id
                FROM audit_export_jobs
                WHERE status = 'pending'
                ORDER BY created_at ASC, id ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            UPDATE audit_export_jobs jobs
            SET
                status = 'processing',
                claimed_by = $1,
                started_at = $2
            FROM candidate
            WHERE jobs.id = candidate.id
            RETURNING {}
            "#,
            qualified_columns("jobs")
        );

        let row = sqlx::query_as::<_, ExportJobRow>(statement.as_str())
            .bind(worker_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to claim export job for worker '{worker_id}': {error}"
                ))
            })?;

        row.map(ExportJob::try_from).transpose()
    }

    pub(super) async fn complete_job_impl(
        &self,
        job_id: ExportJobId,
        worker_id: &str,
        artifact: &ExportArtifactInfo,
        download_token: &str,
        download_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<ExportJob> {
        let statement = format!(
            r#"
            UPDATE audit_export_jobs
            SET
                status = 'completed',
                completed_at = $3,
                artifact_location = $4,
                artifact_size_bytes = $5,
                record_count = $6,
                download_token = $7,
                download_expires_at = $8
            WHERE id = $1
              AND status = 'processing'
              AND claimed_by = $2
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, ExportJobRow>(statement.as_str())
            .bind(job_id.as_uuid())
            .bind(worker_id)
            .bind(now)
            .bind(artifact.location.as_str())
            .bind(i64::try_from(artifact.size_bytes).unwrap_or(i64::MAX))
            .bind(i64::try_from(artifact.record_count).unwrap_or(i64::MAX))
            .bind(download_token)
            .bind(download_expires_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to complete export job '{job_id}': {error}"))
            })?;

        match row {
            Some(row) => ExportJob::try_from(row),
            None => Err(self
                .transition_error(job_id, format!("be completed by worker '{worker_id}'").as_str())
                .await),
        }
    }

    pub(super) async fn fail_job_impl(
        &self,
        job_id: ExportJobId,
        worker_id: Option<&str>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<ExportJob> {
        let statement = format!(
            r#"
            UPDATE audit_export_jobs
            SET
                status = 'failed',
                completed_at = $3,
                failure_reason = $4
            WHERE id = $1
              AND status = 'processing'
              AND ($2::TEXT IS NULL OR claimed_by = $2)
            RETURNING {JOB_COLUMNS}
            "#
        );

        let row = sqlx::query_as::<_, ExportJobRow>(statement.as_str())
            .bind(job_id.as_uuid())
            .bind(worker_id)
            .bind(now)
            .bind(ExportJob::normalize_failure_reason(reason))
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to fail export job '{job_id}': {error}"))
            })?;

        match row {
            Some(row) => ExportJob::try_from(row),
            None => Err(self.transition_error(job_id, "be failed").await),
        }
    }
}

fn qualified_columns(alias: &str) -> String {
    JOB_COLUMNS
        .split(',')
        .map(|column| format!("{alias}.{}", column.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}
