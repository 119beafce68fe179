use std::time::Duration;

use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

use crate::export_config::ExportPipelineConfig;
use crate::export_job_service::ExportJobService;

/// Bounded set of claim loops plus the periodic recovery sweep.
pub struct ExportWorkerPool {
    service: ExportJobService,
    worker_id: String,
    concurrency: usize,
    poll_interval: Duration,
    sweep_interval: Duration,
}

/// Running pool; dropping it leaves the loops running.
pub struct ExportWorkerPoolHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ExportWorkerPoolHandle {
    /// Stops claiming new jobs and waits for in-flight jobs to finish.
    pub async fn shutdown(self) {
        if self.shutdown.send(true).is_err() {
            warn!("export worker pool already stopped");
        }

        if let Err(join_error) = self.task.await {
            error!(error = %join_error, "export worker pool terminated abnormally");
        }
    }
}

impl ExportWorkerPool {
    /// Creates a pool sized by the pipeline configuration.
    #[must_use]
    pub fn new(
        service: ExportJobService,
        worker_id: impl Into<String>,
        config: &ExportPipelineConfig,
    ) -> Self {
        Self {
            service,
            worker_id: worker_id.into(),
            concurrency: config.worker_concurrency.max(1),
            poll_interval: config.poll_interval(),
            sweep_interval: config.sweep_interval(),
        }
    }

    /// Starts the pool on the current runtime.
    #[must_use]
    pub fn spawn(self) -> ExportWorkerPoolHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(self.run(shutdown_rx));
        ExportWorkerPoolHandle { shutdown, task }
    }

    /// Runs until `shutdown` turns true or its sender is dropped.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(
            worker_id = %self.worker_id,
            concurrency = self.concurrency,
            poll_interval_ms = self.poll_interval.as_millis(),
            sweep_interval_seconds = self.sweep_interval.as_secs(),
            "export worker pool started"
        );

        let mut loops = JoinSet::new();
        for slot in 0..self.concurrency {
            loops.spawn(supervised_claim_loop(
                self.service.clone(),
                format!("{}-{slot}", self.worker_id),
                self.poll_interval,
                shutdown.clone(),
            ));
        }
        loops.spawn(sweep_loop(
            self.service.clone(),
            self.sweep_interval,
            shutdown.clone(),
        ));

        while let Some(joined) = loops.join_next().await {
            if let Err(join_error) = joined {
                error!(
                    worker_id = %self.worker_id,
                    error = %join_error,
                    "export worker loop panicked"
                );
            }
        }

        info!(worker_id = %self.worker_id, "export worker pool stopped");
    }
}

/// Runs one claim slot, restarting it after a panic until shutdown.
async fn supervised_claim_loop(
    service: ExportJobService,
    worker_id: String,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
) {
    loop {
        let slot = tokio::spawn(claim_loop(
            service.clone(),
            worker_id.clone(),
            poll_interval,
            shutdown.clone(),
        ));

        match slot.await {
            Ok(()) => break,
            Err(join_error) if join_error.is_panic() && !*shutdown.borrow() => {
                error!(
                    worker_id = %worker_id,
                    error = %join_error,
                    "export claim loop panicked; restarting slot"
                );
            }
            Err(join_error) => {
                error!(
                    worker_id = %worker_id,
                    error = %join_error,
                    "export claim loop terminated abnormally"
                );
                break;
            }
        }
    }
}

async fn claim_loop(
    service: ExportJobService,
    worker_id: String,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        match service.process_next_job(worker_id.as_str()).await {
            Ok(Some(job)) => {
                info!(
                    worker_id = %worker_id,
                    job_id = %job.id,
                    status = %job.status,
                    "export job processed"
                );
                continue;
            }
            Ok(None) => {}
            Err(process_error) => {
                warn!(
                    worker_id = %worker_id,
                    error = %process_error,
                    "failed to process export job"
                );
            }
        }

        if wait_or_shutdown(&mut shutdown, poll_interval).await {
            break;
        }
    }
}

async fn sweep_loop(
    service: ExportJobService,
    sweep_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        match service.recover_stalled_jobs().await {
            Ok(0) => {}
            Ok(recovered) => info!(recovered, "failed stalled export jobs"),
            Err(sweep_error) => warn!(error = %sweep_error, "stalled export sweep failed"),
        }

        match service.purge_expired_jobs().await {
            Ok(0) => {}
            Ok(purged) => info!(purged, "purged expired export jobs"),
            Err(purge_error) => warn!(error = %purge_error, "export purge failed"),
        }

        if wait_or_shutdown(&mut shutdown, sweep_interval).await {
            break;
        }
    }
}

/// Sleeps for `delay`; returns true when the pool should stop.
async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        () = tokio::time::sleep(delay) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use chrono::Duration;

    use auditrail_core::{AppResult, OrganizationId, UserId};
    use auditrail_domain::{
        AuditLogEntry, AuditLogFilter, ExportFormat, ExportJob, ExportJobStatus, MembershipRole,
        UserAuditPermissions,
    };

    use super::ExportWorkerPool;
    use crate::audit_query_service::AuditQueryService;
    use crate::download_token_service::DownloadTokenService;
    use crate::export_config::ExportPipelineConfig;
    use crate::export_job_service::ExportJobService;
    use crate::export_ports::ExportRenderer;
    use crate::export_quota_service::ExportQuotaService;
    use crate::permission_resolver::AuditPermissionResolver;
    use crate::test_support::{
        FakeArtifactStore, FakeDownloadTokenRepository, FakeEventStore, FakeExportJobRepository,
        FakeMembershipRepository, FakeQuotaStore, FakeRenderer, ManualClock, base_time, event_at,
    };

    fn pool_config() -> ExportPipelineConfig {
        ExportPipelineConfig {
            poll_interval_ms: 5,
            sweep_interval_seconds: 1,
            ..ExportPipelineConfig::default()
        }
    }

    /// Panics on its first render, then renders like `FakeRenderer`.
    struct PanicOnceRenderer {
        panicked: AtomicBool,
    }

    impl ExportRenderer for PanicOnceRenderer {
        fn format(&self) -> ExportFormat {
            ExportFormat::Csv
        }

        fn render(&self, _job: &ExportJob, entries: &[AuditLogEntry]) -> AppResult<Vec<u8>> {
            if !self.panicked.swap(true, Ordering::SeqCst) {
                panic!("renderer crashed");
            }
            Ok(format!("{} rows", entries.len()).into_bytes())
        }
    }

    struct PoolFixture {
        service: ExportJobService,
        jobs: Arc<FakeExportJobRepository>,
        artifacts: Arc<FakeArtifactStore>,
        job_ids: Vec<auditrail_domain::ExportJobId>,
    }

    async fn submitted_jobs(
        config: &ExportPipelineConfig,
        renderer: Arc<dyn ExportRenderer>,
        count: usize,
    ) -> PoolFixture {
        let organization_id = OrganizationId::new();
        let requester = UserId::new();

        let memberships = Arc::new(FakeMembershipRepository::default());
        memberships
            .set_role(requester, organization_id, MembershipRole::Owner)
            .await;
        let jobs = Arc::new(FakeExportJobRepository::default());
        let artifacts = Arc::new(FakeArtifactStore::default());
        let clock = Arc::new(ManualClock::starting_at(base_time() + Duration::hours(1)));
        let events = FakeEventStore::with_events(vec![event_at(
            organization_id,
            Some(requester),
            "project.created",
            1,
        )]);
        let tokens = DownloadTokenService::new(
            Arc::new(FakeDownloadTokenRepository::default()),
            jobs.clone(),
            artifacts.clone(),
            clock.clone(),
            config.token_ttl(),
        );
        let service = ExportJobService::new(
            AuditPermissionResolver::new(memberships),
            AuditQueryService::new(Arc::new(events)),
            ExportQuotaService::new(Arc::new(FakeQuotaStore::default()), config.quota_limits()),
            tokens,
            jobs.clone(),
            artifacts.clone(),
            clock,
            config.job_settings(),
        )
        .with_renderer(renderer);

        let permissions = UserAuditPermissions::for_role(organization_id, MembershipRole::Owner);
        let mut job_ids = Vec::new();
        for _ in 0..count {
            let job_id = service
                .request_export(
                    requester,
                    &permissions,
                    ExportFormat::Csv,
                    AuditLogFilter::default(),
                )
                .await
                .unwrap_or_else(|_| unreachable!());
            job_ids.push(job_id);
        }

        PoolFixture {
            service,
            jobs,
            artifacts,
            job_ids,
        }
    }

    async fn completed_count(fixture: &PoolFixture) -> usize {
        let mut completed = 0;
        for job_id in &fixture.job_ids {
            if fixture.jobs.status_of(*job_id).await == Some(ExportJobStatus::Completed) {
                completed += 1;
            }
        }
        completed
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn pool_drains_pending_jobs_and_stops_on_shutdown() {
        let config = pool_config();
        let renderer = Arc::new(FakeRenderer::new(ExportFormat::Csv));
        let fixture = submitted_jobs(&config, renderer, 3).await;
        let pool = ExportWorkerPool::new(fixture.service.clone(), "worker-test", &config);
        let handle = pool.spawn();

        let mut completed = 0;
        for _ in 0..400 {
            completed = completed_count(&fixture).await;
            if completed == fixture.job_ids.len() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let stopped = tokio::time::timeout(std::time::Duration::from_secs(2), handle.shutdown());

        assert!(stopped.await.is_ok());
        assert_eq!(completed, fixture.job_ids.len());
        assert_eq!(fixture.artifacts.len().await, fixture.job_ids.len());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_claim_slot_is_restarted() {
        let config = ExportPipelineConfig {
            worker_concurrency: 1,
            ..pool_config()
        };
        let renderer = Arc::new(PanicOnceRenderer {
            panicked: AtomicBool::new(false),
        });
        let fixture = submitted_jobs(&config, renderer, 2).await;
        let pool = ExportWorkerPool::new(fixture.service.clone(), "worker-panic", &config);
        let handle = pool.spawn();

        let mut completed = 0;
        for _ in 0..400 {
            completed = completed_count(&fixture).await;
            if completed >= 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        let stopped = tokio::time::timeout(std::time::Duration::from_secs(2), handle.shutdown());

        assert!(stopped.await.is_ok());
        assert_eq!(completed, 1);
        assert_eq!(fixture.artifacts.len().await, 1);
    }
}
