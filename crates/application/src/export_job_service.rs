use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use auditrail_core::{AppError, AppResult, UserId};
use auditrail_domain::{
    AuditLogFilter, ExportArtifactInfo, ExportFormat, ExportJob, ExportJobId, ExportJobStatus,
    UserAuditPermissions,
};

use crate::audit_ports::Clock;
use crate::audit_query_service::AuditQueryService;
use crate::download_token_service::DownloadTokenService;
use crate::export_ports::{ArtifactStore, ExportJobRepository, ExportRenderer};
use crate::export_quota_service::ExportQuotaService;
use crate::permission_resolver::AuditPermissionResolver;

mod maintenance;
mod processing;
mod status;
mod submission;


const HISTORY_LIMIT: usize = 50;
const SWEEP_BATCH_LIMIT: usize = 100;

/// Processing limits of export jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportJobSettings {
    /// Largest result set an export may contain.
    pub max_records: u64,
    /// Page size used while collecting rows.
    pub batch_size: u32,
    /// Processing time after which the sweep fails a job.
    pub max_processing: Duration,
    /// Retention after token expiry or failure.
    pub retention_grace: Duration,
}

/// Export job projection returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportJobView {
    /// Job identifier.
    pub job_id: ExportJobId,
    /// User who requested the export.
    pub requested_by: UserId,
    /// Requested format.
    pub format: ExportFormat,
    /// Current status.
    pub status: ExportJobStatus,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Claim time.
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal transition time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Reason of a failed job.
    pub failure_reason: Option<String>,
    /// Rendered entries of a completed job.
    pub record_count: Option<u64>,
    /// Artifact size of a completed job.
    pub artifact_size_bytes: Option<u64>,
    /// Unexpired download token, only for the requester.
    pub download_token: Option<String>,
    /// Token expiry, only for the requester.
    pub download_expires_at: Option<DateTime<Utc>>,
}

impl ExportJobView {
    fn for_viewer(job: ExportJob, viewer: UserId, now: DateTime<Utc>) -> Self {
        let token_visible = job.user_id == viewer
            && job
                .download_expires_at
                .is_some_and(|expires_at| expires_at > now);

        Self {
            job_id: job.id,
            requested_by: job.user_id,
            format: job.format,
            status: job.status,
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            failure_reason: job.failure_reason,
            record_count: job.artifact.as_ref().map(|artifact| artifact.record_count),
            artifact_size_bytes: job.artifact.as_ref().map(|artifact| artifact.size_bytes),
            download_token: job.download_token.filter(|_| token_visible),
            download_expires_at: job.download_expires_at.filter(|_| token_visible),
        }
    }
}

/// Export job state machine, admission, and processing.
#[derive(Clone)]
pub struct ExportJobService {
    permission_resolver: AuditPermissionResolver,
    query_service: AuditQueryService,
    quota_service: ExportQuotaService,
    token_service: DownloadTokenService,
    repository: Arc<dyn ExportJobRepository>,
    artifact_store: Arc<dyn ArtifactStore>,
    renderers: HashMap<ExportFormat, Arc<dyn ExportRenderer>>,
    clock: Arc<dyn Clock>,
    settings: ExportJobSettings,
}

impl ExportJobService {
    /// Creates an export job service without renderers.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        permission_resolver: AuditPermissionResolver,
        query_service: AuditQueryService,
        quota_service: ExportQuotaService,
        token_service: DownloadTokenService,
        repository: Arc<dyn ExportJobRepository>,
        artifact_store: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
        settings: ExportJobSettings,
    ) -> Self {
        Self {
            permission_resolver,
            query_service,
            quota_service,
            token_service,
            repository,
            artifact_store,
            renderers: HashMap::new(),
            clock,
            settings,
        }
    }

    /// Registers the renderer for its format, replacing any previous one.
    #[must_use]
    pub fn with_renderer(mut self, renderer: Arc<dyn ExportRenderer>) -> Self {
        self.renderers.insert(renderer.format(), renderer);
        self
    }

    fn renderer(&self, format: ExportFormat) -> AppResult<&Arc<dyn ExportRenderer>> {
        self.renderers.get(&format).ok_or_else(|| {
            AppError::Validation(format!("export format '{format}' is not supported"))
        })
    }

    async fn release_quota(&self, job: &ExportJob) {
        if let Err(release_error) = self.quota_service.release(job.user_id, job.id).await {
            error!(
                job_id = %job.id,
                user_id = %job.user_id,
                error = %release_error,
                "failed to release export quota slot"
            );
        }
    }
}
