use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use auditrail_application::ExportJobRepository;
use auditrail_core::{AppError, AppResult, OrganizationId, UserId};
use auditrail_domain::{ExportArtifactInfo, ExportJob, ExportJobId, ExportJobStatus};

/// In-memory export job table.
///
/// One mutex guards every transition, so claims and terminal transitions are
/// atomic with respect to each other.
#[derive(Debug, Default)]
pub struct InMemoryExportJobRepository {
    jobs: Mutex<HashMap<ExportJobId, ExportJob>>,
}

impl InMemoryExportJobRepository {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn job_not_found(job_id: ExportJobId) -> AppError {
    AppError::NotFound(format!("export job '{job_id}' not found"))
}

#[async_trait]
impl ExportJobRepository for InMemoryExportJobRepository {
    async fn create_job(&self, job: ExportJob) -> AppResult<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&job.id) {
            return Err(AppError::Conflict(format!(
                "export job '{}' already exists",
                job.id
            )));
        }

        jobs.insert(job.id, job);
        Ok(())
    }

    async fn find_job(&self, job_id: ExportJobId) -> AppResult<Option<ExportJob>> {
        Ok(self.jobs.lock().await.get(&job_id).cloned())
    }

    async fn list_jobs_for_user(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<ExportJob>> {
        let mut jobs: Vec<ExportJob> = self
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| job.organization_id == organization_id && job.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|left, right| {
            right
                .created_at
                .cmp(&left.created_at)
                .then_with(|| right.id.cmp(&left.id))
        });
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn claim_next_pending(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ExportJob>> {
        let mut jobs = self.jobs.lock().await;
        let Some(job) = jobs
            .values_mut()
            .filter(|job| job.status == ExportJobStatus::Pending)
            .min_by_key(|job| (job.created_at, job.id))
        else {
            return Ok(None);
        };

        job.claim(worker_id, now)?;
        Ok(Some(job.clone()))
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
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&job_id).ok_or_else(|| job_not_found(job_id))?;
        job.complete(
            worker_id,
            artifact.clone(),
            download_token.to_owned(),
            download_expires_at,
            now,
        )?;
        Ok(job.clone())
    }

    async fn fail_job(
        &self,
        job_id: ExportJobId,
        worker_id: Option<&str>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<ExportJob> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs.get_mut(&job_id).ok_or_else(|| job_not_found(job_id))?;
        job.fail(worker_id, reason, now)?;
        Ok(job.clone())
    }

    async fn list_stalled_jobs(
        &self,
        started_before: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExportJob>> {
        Ok(self
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| job.is_stalled(started_before))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn list_purgeable_jobs(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExportJob>> {
        Ok(self
            .jobs
            .lock()
            .await
            .values()
            .filter(|job| job.is_purgeable(cutoff))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete_job(&self, job_id: ExportJobId) -> AppResult<()> {
        let mut jobs = self.jobs.lock().await;
        if jobs.get(&job_id).is_some_and(ExportJob::is_active) {
            return Err(AppError::Conflict(format!(
                "export job '{job_id}' is still active"
            )));
        }

        jobs.remove(&job_id);
        Ok(())
    }
}
