use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;

use auditrail_core::{AppError, AppResult, RateLimitReason, UserId};
use auditrail_domain::ExportJobId;

use crate::export_ports::{ExportQuotaLimits, ExportQuotaStore, QuotaReservation};

/// Admission outcome for one export submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Slot and submission were reserved for the job.
    Admitted,
    /// The user already has the maximum number of running exports.
    RejectedConcurrent,
    /// The user reached the rolling hourly cap.
    RejectedRate {
        /// Seconds until the oldest submission leaves the window.
        retry_after_seconds: u64,
    },
}

impl AdmissionDecision {
    /// Converts a rejection into the matching rate limit error.
    pub fn into_result(self) -> AppResult<()> {
        match self {
            Self::Admitted => Ok(()),
            Self::RejectedConcurrent => Err(AppError::RateLimited {
                reason: RateLimitReason::Concurrent,
                retry_after_seconds: None,
            }),
            Self::RejectedRate {
                retry_after_seconds,
            } => Err(AppError::RateLimited {
                reason: RateLimitReason::Hourly,
                retry_after_seconds: Some(retry_after_seconds),
            }),
        }
    }
}

/// Per-user export admission control over an atomic counter store.
#[derive(Clone)]
pub struct ExportQuotaService {
    store: Arc<dyn ExportQuotaStore>,
    limits: ExportQuotaLimits,
}

impl ExportQuotaService {
    /// Creates an admission service with fixed limits.
    #[must_use]
    pub fn new(store: Arc<dyn ExportQuotaStore>, limits: ExportQuotaLimits) -> Self {
        Self { store, limits }
    }

    /// Returns the configured limits.
    #[must_use]
    pub fn limits(&self) -> ExportQuotaLimits {
        self.limits
    }

    /// Checks both caps and reserves a slot for `job_id` in one atomic step.
    pub async fn try_admit(
        &self,
        user_id: UserId,
        job_id: ExportJobId,
        now: DateTime<Utc>,
    ) -> AppResult<AdmissionDecision> {
        let reservation = self
            .store
            .try_reserve(user_id, job_id, self.limits, now)
            .await?;

        let decision = match reservation {
            QuotaReservation::Reserved => AdmissionDecision::Admitted,
            QuotaReservation::ConcurrentLimitReached => AdmissionDecision::RejectedConcurrent,
            QuotaReservation::WindowLimitReached {
                oldest_submission_at,
            } => {
                let remaining = (oldest_submission_at + self.limits.window - now).num_seconds();
                AdmissionDecision::RejectedRate {
                    retry_after_seconds: u64::try_from(remaining).unwrap_or(0).max(1),
                }
            }
        };

        if decision != AdmissionDecision::Admitted {
            info!(user_id = %user_id, decision = ?decision, "export admission rejected");
        }

        Ok(decision)
    }

    /// Frees the job's concurrent slot after its terminal transition.
    pub async fn release(&self, user_id: UserId, job_id: ExportJobId) -> AppResult<bool> {
        self.store.release(user_id, job_id).await
    }

    /// Undoes an admission whose job could not be persisted.
    pub async fn rollback(&self, user_id: UserId, job_id: ExportJobId) -> AppResult<()> {
        self.store.rollback(user_id, job_id).await
    }
}
