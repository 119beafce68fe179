use super::*;

impl ExportJobService {
    /// Claims the oldest pending job for `worker_id` and runs it to a terminal
    /// state. Returns `None` when nothing is pending.
    pub async fn process_next_job(&self, worker_id: &str) -> AppResult<Option<ExportJob>> {
        if worker_id.trim().is_empty() {
            return Err(AppError::Validation(
                "worker_id must not be empty".to_owned(),
            ));
        }

        let Some(job) = self
            .repository
            .claim_next_pending(worker_id, self.clock.now())
            .await?
        else {
            return Ok(None);
        };

        info!(job_id = %job.id, worker_id = %worker_id, "export job claimed");
        self.process_claimed_job(worker_id, job).await.map(Some)
    }

    /// Runs one claimed job: collect, render, store, issue token, complete.
    ///
    /// Pipeline failures are recorded on the job, not returned. An error is
    /// returned only when the terminal transition itself could not be made.
    pub async fn process_claimed_job(
        &self,
        worker_id: &str,
        job: ExportJob,
    ) -> AppResult<ExportJob> {
        match self.produce_artifact(&job).await {
            Ok(artifact) => self.finish_completed(worker_id, &job, artifact).await,
            Err(pipeline_error) => self.finish_failed(worker_id, &job, &pipeline_error).await,
        }
    }

    async fn produce_artifact(&self, job: &ExportJob) -> AppResult<ExportArtifactInfo> {
        let permissions = self
            .permission_resolver
            .resolve(job.user_id, job.organization_id)
            .await
            .map_err(|resolve_error| match resolve_error {
                AppError::Unauthorized(_) => AppError::Forbidden(
                    "the requesting user is no longer a member of the organization".to_owned(),
                ),
                other => other,
            })?;

        if !permissions.can_export_audit_logs() {
            return Err(AppError::Forbidden(
                "the requesting user may no longer export audit logs".to_owned(),
            ));
        }

        let renderer = self.renderer(job.format)?;
        let entries = self
            .query_service
            .collect_for_export(
                &permissions,
                &job.filter,
                job.created_at,
                self.settings.batch_size,
                self.settings.max_records,
            )
            .await?;

        let bytes = renderer.render(job, &entries)?;
        let size_bytes = u64::try_from(bytes.len()).unwrap_or(u64::MAX);
        let location = self.artifact_store.put(job.id, job.format, bytes).await?;

        Ok(ExportArtifactInfo {
            location,
            size_bytes,
            record_count: u64::try_from(entries.len()).unwrap_or(u64::MAX),
        })
    }

    async fn finish_completed(
        &self,
        worker_id: &str,
        job: &ExportJob,
        artifact: ExportArtifactInfo,
    ) -> AppResult<ExportJob> {
        let issued = match self.token_service.issue(job.id).await {
            Ok(issued) => issued,
            Err(issue_error) => {
                self.discard_artifact(job.id, &artifact).await;
                return self.finish_failed(worker_id, job, &issue_error).await;
            }
        };

        let completed = self
            .repository
            .complete_job(
                job.id,
                worker_id,
                &artifact,
                issued.token.as_str(),
                issued.expires_at,
                self.clock.now(),
            )
            .await;

        match completed {
            Ok(completed) => {
                self.release_quota(&completed).await;
                info!(
                    job_id = %completed.id,
                    worker_id = %worker_id,
                    record_count = artifact.record_count,
                    size_bytes = artifact.size_bytes,
                    "export job completed"
                );
                Ok(completed)
            }
            Err(transition_error) => {
                warn!(
                    job_id = %job.id,
                    worker_id = %worker_id,
                    error = %transition_error,
                    "export job finished after losing its claim; discarding artifact"
                );
                self.discard_artifact(job.id, &artifact).await;
                if let Err(revoke_error) = self.token_service.revoke_for_job(job.id).await {
                    warn!(
                        job_id = %job.id,
                        error = %revoke_error,
                        "failed to revoke download token"
                    );
                }
                Err(transition_error)
            }
        }
    }

    async fn finish_failed(
        &self,
        worker_id: &str,
        job: &ExportJob,
        pipeline_error: &AppError,
    ) -> AppResult<ExportJob> {
        let reason = failure_reason(pipeline_error);
        warn!(
            job_id = %job.id,
            worker_id = %worker_id,
            error = %pipeline_error,
            "export job failed"
        );

        let failed = self
            .repository
            .fail_job(job.id, Some(worker_id), reason.as_str(), self.clock.now())
            .await?;
        self.release_quota(&failed).await;
        Ok(failed)
    }

    async fn discard_artifact(&self, job_id: ExportJobId, artifact: &ExportArtifactInfo) {
        if let Err(delete_error) = self.artifact_store.delete(artifact.location.as_str()).await {
            warn!(job_id = %job_id, error = %delete_error, "failed to delete export artifact");
        }
    }
}

/// Human-readable job failure reason. Internal details stay in the logs.
fn failure_reason(pipeline_error: &AppError) -> String {
    match pipeline_error {
        AppError::Validation(message)
        | AppError::Forbidden(message)
        | AppError::Unauthorized(message)
        | AppError::NotFound(message) => message.clone(),
        AppError::Conflict(_)
        | AppError::RateLimited { .. }
        | AppError::InvalidToken
        | AppError::Internal(_) => "the export could not be rendered or stored".to_owned(),
    }
}
