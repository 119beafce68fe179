use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use auditrail_core::{AppResult, UserId};
use auditrail_domain::ExportJobId;

/// Per-user admission caps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportQuotaLimits {
    /// Maximum non-terminal jobs per user.
    pub max_concurrent: u32,
    /// Maximum submissions per user inside `window`.
    pub max_per_window: u32,
    /// Rolling submission window.
    pub window: Duration,
}

/// Outcome of an atomic check-and-reserve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaReservation {
    /// Both counters were incremented for the job.
    Reserved,
    /// The concurrent cap is reached.
    ConcurrentLimitReached,
    /// The rolling window cap is reached.
    WindowLimitReached {
        /// When the oldest submission in the window leaves it.
        oldest_submission_at: DateTime<Utc>,
    },
}

/// Contended admission counters.
///
/// `try_reserve` must check both caps and record the job in one atomic step.
/// `release` is idempotent per job id so the concurrent counter is
/// decremented at most once.
#[async_trait]
pub trait ExportQuotaStore: Send + Sync {
    /// Checks both caps and, when admitted, records the job as active and as a
    /// submission at `now`.
    async fn try_reserve(
        &self,
        user_id: UserId,
        job_id: ExportJobId,
        limits: ExportQuotaLimits,
        now: DateTime<Utc>,
    ) -> AppResult<QuotaReservation>;

    /// Frees the job's concurrent slot. Returns whether a slot was freed.
    async fn release(&self, user_id: UserId, job_id: ExportJobId) -> AppResult<bool>;

    /// Undoes a reservation whose job was never persisted, including its
    /// submission record.
    async fn rollback(&self, user_id: UserId, job_id: ExportJobId) -> AppResult<()>;
}
