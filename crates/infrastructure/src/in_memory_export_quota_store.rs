use std::collections::{HashMap, HashSet, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use auditrail_application::{ExportQuotaLimits, ExportQuotaStore, QuotaReservation};
use auditrail_core::{AppResult, UserId};
use auditrail_domain::ExportJobId;

#[derive(Debug, Default)]
struct UserQuota {
    active: HashSet<ExportJobId>,
    submissions: VecDeque<(DateTime<Utc>, ExportJobId)>,
}

impl UserQuota {
    fn prune(&mut self, window: Duration, now: DateTime<Utc>) {
        while self
            .submissions
            .front()
            .is_some_and(|(submitted_at, _)| *submitted_at + window <= now)
        {
            self.submissions.pop_front();
        }
    }

    fn is_empty(&self) -> bool {
        self.active.is_empty() && self.submissions.is_empty()
    }
}

/// Process-local quota counters under one mutex.
///
/// Only correct when a single process admits exports, which is the case for
/// the memory backend.
#[derive(Debug, Default)]
pub struct InMemoryExportQuotaStore {
    users: Mutex<HashMap<UserId, UserQuota>>,
}

impl InMemoryExportQuotaStore {
    /// Creates empty counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    async fn tracked_users(&self) -> usize {
        self.users.lock().await.len()
    }
}

#[async_trait]
impl ExportQuotaStore for InMemoryExportQuotaStore {
    async fn try_reserve(
        &self,
        user_id: UserId,
        job_id: ExportJobId,
        limits: ExportQuotaLimits,
        now: DateTime<Utc>,
    ) -> AppResult<QuotaReservation> {
        let mut users = self.users.lock().await;
        // Users whose window has lapsed with nothing running are dropped here.
        users.retain(|_, quota| {
            quota.prune(limits.window, now);
            !quota.is_empty()
        });

        let max_concurrent = usize::try_from(limits.max_concurrent).unwrap_or(usize::MAX);
        let max_per_window = usize::try_from(limits.max_per_window).unwrap_or(usize::MAX);
        let quota = users.get(&user_id);
        let running = quota.map_or(0, |quota| quota.active.len());
        if running >= max_concurrent {
            return Ok(QuotaReservation::ConcurrentLimitReached);
        }

        if let Some(quota) = quota
            && quota.submissions.len() >= max_per_window
            && let Some((oldest_submission_at, _)) = quota.submissions.front()
        {
            return Ok(QuotaReservation::WindowLimitReached {
                oldest_submission_at: *oldest_submission_at,
            });
        }

        let quota = users.entry(user_id).or_default();
        quota.active.insert(job_id);
        quota.submissions.push_back((now, job_id));
        Ok(QuotaReservation::Reserved)
    }

    async fn release(&self, user_id: UserId, job_id: ExportJobId) -> AppResult<bool> {
        let mut users = self.users.lock().await;
        let Some(quota) = users.get_mut(&user_id) else {
            return Ok(false);
        };
        let released = quota.active.remove(&job_id);
        if quota.is_empty() {
            users.remove(&user_id);
        }
        Ok(released)
    }

    async fn rollback(&self, user_id: UserId, job_id: ExportJobId) -> AppResult<()> {
        let mut users = self.users.lock().await;
        if let Some(quota) = users.get_mut(&user_id) {
            quota.active.remove(&job_id);
            quota
                .submissions
                .retain(|(_, submitted_job_id)| *submitted_job_id != job_id);
            if quota.is_empty() {
                users.remove(&user_id);
            }
        }
        Ok(())
    }
}
