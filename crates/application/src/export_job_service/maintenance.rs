use super::*;

impl ExportJobService {
    /// Fails jobs stuck in processing past the maximum duration and frees
    /// their quota slots. Returns the number of recovered jobs.
    pub async fn recover_stalled_jobs(&self) -> AppResult<usize> {
        let now = self.clock.now();
        let started_before = now - self.settings.max_processing;
        let stalled = self
            .repository
            .list_stalled_jobs(started_before, SWEEP_BATCH_LIMIT)
            .await?;

        let reason = format!(
            "export exceeded the maximum processing time of {} seconds",
            self.settings.max_processing.num_seconds()
        );

        let mut recovered = 0;
        for job in stalled {
            match self
                .repository
                .fail_job(job.id, None, reason.as_str(), now)
                .await
            {
                Ok(failed) => {
                    warn!(
                        job_id = %failed.id,
                        claimed_by = failed.claimed_by.as_deref().unwrap_or_default(),
                        "stalled export job failed by recovery sweep"
                    );
                    self.release_quota(&failed).await;
                    recovered += 1;
                }
                Err(AppError::Conflict(_)) => {}
                Err(sweep_error) => return Err(sweep_error),
            }
        }

        Ok(recovered)
    }

    /// Deletes terminal jobs past retention together with their tokens and
    /// artifacts. Returns the number of purged jobs.
    pub async fn purge_expired_jobs(&self) -> AppResult<usize> {
        let cutoff = self.clock.now() - self.settings.retention_grace;
        let expired = self
            .repository
            .list_purgeable_jobs(cutoff, SWEEP_BATCH_LIMIT)
            .await?;

        let mut purged = 0;
        for job in expired {
            if let Some(artifact) = &job.artifact {
                self.artifact_store.delete(artifact.location.as_str()).await?;
            }
            self.token_service.revoke_for_job(job.id).await?;
            self.release_quota(&job).await;
            self.repository.delete_job(job.id).await?;
            purged += 1;
        }

        if purged > 0 {
            info!(purged, "expired export jobs purged");
        }

        Ok(purged)
    }
}
