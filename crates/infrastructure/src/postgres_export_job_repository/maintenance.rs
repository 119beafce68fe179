use super::*;

impl PostgresExportJobRepository {
    pub(super) async fn list_stalled_jobs_impl(
        &self,
        started_before: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExportJob>> {
        let statement = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM audit_export_jobs
            WHERE status = 'processing'
              AND started_at <= $1
            ORDER BY started_at ASC
            LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<_, ExportJobRow>(statement.as_str())
            .bind(started_before)
            .bind(sql_limit(limit)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to list stalled export jobs: {error}"))
            })?;

        jobs_from_rows(rows)
    }

    pub(super) async fn list_purgeable_jobs_impl(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExportJob>> {
        let statement = format!(
            r#"
            SELECT {JOB_COLUMNS}
            FROM audit_export_jobs
            WHERE (
                    status = 'completed'
                    AND COALESCE(download_expires_at, completed_at) <= $1
                  )
               OR (status = 'failed' AND completed_at <= $1)
            ORDER BY completed_at ASC
            LIMIT $2
            "#
        );
        let rows = sqlx::query_as::<_, ExportJobRow>(statement.as_str())
            .bind(cutoff)
            .bind(sql_limit(limit)?)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to list purgeable export jobs: {error}"))
            })?;

        jobs_from_rows(rows)
    }

    pub(super) async fn delete_job_impl(&self, job_id: ExportJobId) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM audit_export_jobs
            WHERE id = $1
              AND status IN ('completed', 'failed')
            "#,
        )
        .bind(job_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to delete export job '{job_id}': {error}"))
        })?;

        if result.rows_affected() == 0
            && self
                .find_job(job_id)
                .await?
                .is_some_and(|job| job.is_active())
        {
            return Err(AppError::Conflict(format!(
                "export job '{job_id}' is still active"
            )));
        }

        Ok(())
    }
}
