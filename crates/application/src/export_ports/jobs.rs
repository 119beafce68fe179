use async_trait::async_trait;
use chrono::{DateTime, Utc};

use auditrail_core::{AppResult, OrganizationId, UserId};
use auditrail_domain::{ExportArtifactInfo, ExportJob, ExportJobId};

/// Repository port for export jobs.
///
/// Transition methods are compare-and-swap operations: they return
/// `AppError::Conflict` when the job is no longer in the expected state, so at
/// most one caller wins each transition.
#[async_trait]
pub trait ExportJobRepository: Send + Sync {
    /// Persists a new pending job.
    async fn create_job(&self, job: ExportJob) -> AppResult<()>;

    /// Returns one job regardless of organization.
    async fn find_job(&self, job_id: ExportJobId) -> AppResult<Option<ExportJob>>;

    /// Lists one user's jobs in an organization, newest first.
    async fn list_jobs_for_user(
        &self,
        organization_id: OrganizationId,
        user_id: UserId,
        limit: usize,
    ) -> AppResult<Vec<ExportJob>>;

    /// Atomically moves the oldest pending job to processing for `worker_id`.
    async fn claim_next_pending(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ExportJob>>;

    /// Moves a job claimed by `worker_id` from processing to completed.
    async fn complete_job(
        &self,
        job_id: ExportJobId,
        worker_id: &str,
        artifact: &ExportArtifactInfo,
        download_token: &str,
        download_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<ExportJob>;

    /// Moves a processing job to failed.
    ///
    /// With `worker_id` set the claim must match; the recovery sweep passes
    /// `None`.
    async fn fail_job(
        &self,
        job_id: ExportJobId,
        worker_id: Option<&str>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<ExportJob>;

    /// Lists processing jobs claimed at or before `started_before`.
    async fn list_stalled_jobs(
        &self,
        started_before: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExportJob>>;

    /// Lists terminal jobs whose retention ended at or before `cutoff`.
    async fn list_purgeable_jobs(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> AppResult<Vec<ExportJob>>;

    /// Deletes one terminal job.
    async fn delete_job(&self, job_id: ExportJobId) -> AppResult<()>;
}
