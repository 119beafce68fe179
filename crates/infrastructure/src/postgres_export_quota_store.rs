use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use auditrail_application::{ExportQuotaLimits, ExportQuotaStore, QuotaReservation};
use auditrail_core::{AppError, AppResult, UserId};
use auditrail_domain::ExportJobId;

/// PostgreSQL-backed export quota counters.
///
/// One row per reservation. Admission for a user is serialized with a
/// transaction-scoped advisory lock keyed by the user id.
#[derive(Clone)]
pub struct PostgresExportQuotaStore {
    pool: PgPool,
}

impl PostgresExportQuotaStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct QuotaUsageRow {
    active_count: i64,
    window_count: i64,
    oldest_submission_at: Option<DateTime<Utc>>,
}

#[async_trait]
impl ExportQuotaStore for PostgresExportQuotaStore {
    async fn try_reserve(
        &self,
        user_id: UserId,
        job_id: ExportJobId,
        limits: ExportQuotaLimits,
        now: DateTime<Utc>,
    ) -> AppResult<QuotaReservation> {
        let window_start = now - limits.window;
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start quota transaction: {error}"))
        })?;

        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1::TEXT, 0))")
            .bind(user_id.as_uuid().to_string())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to lock export quota for user: {error}"))
            })?;

        sqlx::query(
            r#"
            DELETE FROM audit_export_quota_reservations
            WHERE user_id = $1
              AND released_at IS NOT NULL
              AND reserved_at <= $2
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(window_start)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to prune export quota reservations: {error}"))
        })?;

        let usage = sqlx::query_as::<_, QuotaUsageRow>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE released_at IS NULL) AS active_count,
                COUNT(*) FILTER (WHERE reserved_at > $2) AS window_count,
                MIN(reserved_at) FILTER (WHERE reserved_at > $2) AS oldest_submission_at
            FROM audit_export_quota_reservations
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(window_start)
        .fetch_one(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to count export quota usage: {error}"))
        })?;

        if usage.active_count >= i64::from(limits.max_concurrent) {
            return Ok(QuotaReservation::ConcurrentLimitReached);
        }

        if usage.window_count >= i64::from(limits.max_per_window) {
            return Ok(QuotaReservation::WindowLimitReached {
                oldest_submission_at: usage.oldest_submission_at.unwrap_or(now),
            });
        }

        sqlx::query(
            r#"
            INSERT INTO audit_export_quota_reservations (job_id, user_id, reserved_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(now)
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to reserve export quota for job '{job_id}': {error}"
            ))
        })?;

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit quota reservation: {error}"))
        })?;

        Ok(QuotaReservation::Reserved)
    }

    async fn release(&self, user_id: UserId, job_id: ExportJobId) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE audit_export_quota_reservations
            SET released_at = now()
            WHERE job_id = $1
              AND user_id = $2
              AND released_at IS NULL
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to release export quota for job '{job_id}': {error}"
            ))
        })?;

        Ok(result.rows_affected() > 0)
    }

    async fn rollback(&self, user_id: UserId, job_id: ExportJobId) -> AppResult<()> {
        sqlx::query(
            r#"
            DELETE FROM audit_export_quota_reservations
            WHERE job_id = $1
              AND user_id = $2
            "#,
        )
        .bind(job_id.as_uuid())
        .bind(user_id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!(
                "failed to roll back export quota for job '{job_id}': {error}"
            ))
        })?;

        Ok(())
    }
}
