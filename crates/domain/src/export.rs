use std::fmt::{Display, Formatter};
use std::str::FromStr;

use auditrail_core::{AppError, AppResult, OrganizationId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::filter::AuditLogFilter;

/// Export job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExportJobId(Uuid);

impl ExportJobId {
    /// Creates a random identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Parses an identifier from its transport representation.
    pub fn parse(value: &str) -> AppResult<Self> {
        Uuid::parse_str(value.trim()).map(Self).map_err(|error| {
            AppError::Validation(format!("invalid export job id '{value}': {error}"))
        })
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for ExportJobId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for ExportJobId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(formatter)
    }
}

/// Artifact format of an export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Comma-separated values.
    Csv,
    /// JSON array document.
    Json,
    /// Printable PDF report.
    Pdf,
}

impl ExportFormat {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Pdf => "pdf",
        }
    }

    /// MIME type served with the artifact.
    #[must_use]
    pub fn content_type(self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Json => "application/json",
            Self::Pdf => "application/pdf",
        }
    }

    /// File extension including the leading dot.
    #[must_use]
    pub fn file_extension(self) -> &'static str {
        match self {
            Self::Csv => ".csv",
            Self::Json => ".json",
            Self::Pdf => ".pdf",
        }
    }
}

impl Display for ExportFormat {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(value: &str) -> AppResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            "pdf" => Ok(Self::Pdf),
            _ => Err(AppError::Validation(format!(
                "unknown export format '{value}'"
            ))),
        }
    }
}

/// Export job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportJobStatus {
    /// Accepted, waiting for a worker.
    Pending,
    /// Claimed by exactly one worker.
    Processing,
    /// Artifact stored and download token issued.
    Completed,
    /// Terminated with a failure reason.
    Failed,
}

impl ExportJobStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether no further transition is possible.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the state machine allows moving to `next`.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl Display for ExportJobStatus {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for ExportJobStatus {
    type Err = AppError;

    fn from_str(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown export job status '{value}'"
            ))),
        }
    }
}

/// Stored artifact produced by a completed export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportArtifactInfo {
    /// Opaque artifact store location.
    pub location: String,
    /// Artifact size in bytes.
    pub size_bytes: u64,
    /// Number of audit entries rendered.
    pub record_count: u64,
}

/// Asynchronous audit log export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportJob {
    /// Job identifier.
    pub id: ExportJobId,
    /// Requesting user.
    pub user_id: UserId,
    /// Organization the export is scoped to.
    pub organization_id: OrganizationId,
    /// Filter snapshot taken at submission.
    pub filter: AuditLogFilter,
    /// Requested artifact format.
    pub format: ExportFormat,
    /// Current lifecycle state.
    pub status: ExportJobStatus,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// Worker holding the claim.
    pub claimed_by: Option<String>,
    /// Claim time.
    pub started_at: Option<DateTime<Utc>>,
    /// Terminal transition time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Human-readable reason for a failed job.
    pub failure_reason: Option<String>,
    /// Stored artifact of a completed job.
    pub artifact: Option<ExportArtifactInfo>,
    /// Download token, only ever shown to the requesting user.
    pub download_token: Option<String>,
    /// Token expiry.
    pub download_expires_at: Option<DateTime<Utc>>,
}

impl ExportJob {
    /// Creates a pending job.
    #[must_use]
    pub fn new(
        id: ExportJobId,
        user_id: UserId,
        organization_id: OrganizationId,
        filter: AuditLogFilter,
        format: ExportFormat,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            user_id,
            organization_id,
            filter,
            format,
            status: ExportJobStatus::Pending,
            created_at,
            claimed_by: None,
            started_at: None,
            completed_at: None,
            failure_reason: None,
            artifact: None,
            download_token: None,
            download_expires_at: None,
        }
    }

    /// Whether the job still holds a concurrency slot.
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }

    /// PENDING to PROCESSING.
    pub fn claim(&mut self, worker_id: &str, now: DateTime<Utc>) -> AppResult<()> {
        self.ensure_transition(ExportJobStatus::Processing)?;
        self.status = ExportJobStatus::Processing;
        self.claimed_by = Some(worker_id.to_owned());
        self.started_at = Some(now);
        Ok(())
    }

    /// PROCESSING to COMPLETED, only for the claiming worker.
    pub fn complete(
        &mut self,
        worker_id: &str,
        artifact: ExportArtifactInfo,
        download_token: String,
        download_expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.ensure_transition(ExportJobStatus::Completed)?;
        self.ensure_claimed_by(worker_id)?;
        self.status = ExportJobStatus::Completed;
        self.completed_at = Some(now);
        self.artifact = Some(artifact);
        self.download_token = Some(download_token);
        self.download_expires_at = Some(download_expires_at);
        Ok(())
    }

    /// PROCESSING to FAILED.
    ///
    /// With `worker_id` set the claim must match; the recovery sweep passes
    /// `None`.
    pub fn fail(
        &mut self,
        worker_id: Option<&str>,
        reason: &str,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        self.ensure_transition(ExportJobStatus::Failed)?;
        if let Some(worker_id) = worker_id {
            self.ensure_claimed_by(worker_id)?;
        }

        self.status = ExportJobStatus::Failed;
        self.completed_at = Some(now);
        self.failure_reason = Some(Self::normalize_failure_reason(reason));
        Ok(())
    }

    /// Failure reason as stored: trimmed, never empty.
    #[must_use]
    pub fn normalize_failure_reason(reason: &str) -> String {
        let reason = reason.trim();
        if reason.is_empty() {
            "export failed".to_owned()
        } else {
            reason.to_owned()
        }
    }

    /// Whether the job was claimed at or before `started_before` and is still
    /// processing.
    #[must_use]
    pub fn is_stalled(&self, started_before: DateTime<Utc>) -> bool {
        self.status == ExportJobStatus::Processing
            && self
                .started_at
                .is_some_and(|started_at| started_at <= started_before)
    }

    /// Whether the job's retention ended at or before `cutoff`.
    ///
    /// Completed jobs are retained from their token expiry, failed jobs from
    /// the failure time.
    #[must_use]
    pub fn is_purgeable(&self, cutoff: DateTime<Utc>) -> bool {
        let retained_from = match self.status {
            ExportJobStatus::Completed => self.download_expires_at.or(self.completed_at),
            ExportJobStatus::Failed => self.completed_at,
            ExportJobStatus::Pending | ExportJobStatus::Processing => None,
        };

        retained_from.is_some_and(|retained_from| retained_from <= cutoff)
    }

    fn ensure_transition(&self, next: ExportJobStatus) -> AppResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(AppError::Conflict(format!(
                "export job '{}' cannot move from {} to {}",
                self.id, self.status, next
            )));
        }

        Ok(())
    }

    fn ensure_claimed_by(&self, worker_id: &str) -> AppResult<()> {
        if self.claimed_by.as_deref() != Some(worker_id) {
            return Err(AppError::Conflict(format!(
                "export job '{}' is not claimed by worker '{worker_id}'",
                self.id
            )));
        }

        Ok(())
    }
}
