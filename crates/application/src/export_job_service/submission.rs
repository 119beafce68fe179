use super::*;

impl ExportJobService {
    /// Admits and persists a new export job, returning immediately.
    ///
    /// The filter is validated and bound to the caller's organization before
    /// it is snapshotted into the job.
    pub async fn request_export(
        &self,
        user_id: UserId,
        permissions: &UserAuditPermissions,
        format: ExportFormat,
        filter: AuditLogFilter,
    ) -> AppResult<ExportJobId> {
        let organization_id = permissions.organization_id();
        if !permissions.can_export_audit_logs() {
            return Err(AppError::Forbidden(format!(
                "audit log export is not granted in organization '{organization_id}'"
            )));
        }

        self.renderer(format)?;
        let filter = filter
            .with_page(0, self.settings.batch_size)
            .normalized()?
            .scoped_to(organization_id);

        let job_id = ExportJobId::new();
        let now = self.clock.now();
        self.quota_service
            .try_admit(user_id, job_id, now)
            .await?
            .into_result()?;

        let job = ExportJob::new(job_id, user_id, organization_id, filter, format, now);
        if let Err(create_error) = self.repository.create_job(job).await {
            if let Err(rollback_error) = self.quota_service.rollback(user_id, job_id).await {
                error!(
                    job_id = %job_id,
                    user_id = %user_id,
                    error = %rollback_error,
                    "failed to roll back export quota reservation"
                );
            }
            return Err(create_error);
        }

        info!(
            job_id = %job_id,
            user_id = %user_id,
            organization_id = %organization_id,
            format = %format,
            "export job accepted"
        );

        Ok(job_id)
    }
}
