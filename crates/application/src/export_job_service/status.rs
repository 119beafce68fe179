use super::*;

impl ExportJobService {
    /// Returns one export job of the caller's organization.
    ///
    /// Jobs of other organizations are reported as not found. Only the
    /// requester sees the download token.
    pub async fn get_status(
        &self,
        user_id: UserId,
        permissions: &UserAuditPermissions,
        job_id: ExportJobId,
    ) -> AppResult<ExportJobView> {
        let organization_id = permissions.organization_id();
        let job = self.repository.find_job(job_id).await?;

        let Some(job) = job else {
            return Err(job_not_found(job_id));
        };

        if job.organization_id != organization_id {
            warn!(
                job_id = %job_id,
                organization_id = %organization_id,
                "export status requested across organizations"
            );
            return Err(job_not_found(job_id));
        }

        if job.user_id != user_id && !permissions.can_view_audit_logs() {
            return Err(job_not_found(job_id));
        }

        Ok(ExportJobView::for_viewer(job, user_id, self.clock.now()))
    }

    /// Lists the caller's own export jobs, newest first.
    pub async fn list_exports(
        &self,
        user_id: UserId,
        permissions: &UserAuditPermissions,
    ) -> AppResult<Vec<ExportJobView>> {
        let now = self.clock.now();
        let jobs = self
            .repository
            .list_jobs_for_user(permissions.organization_id(), user_id, HISTORY_LIMIT)
            .await?;

        Ok(jobs
            .into_iter()
            .map(|job| ExportJobView::for_viewer(job, user_id, now))
            .collect())
    }
}

fn job_not_found(job_id: ExportJobId) -> AppError {
    AppError::NotFound(format!("export job '{job_id}' not found"))
}
