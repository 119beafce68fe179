//! Single-use, expiring capability tokens for export artifacts.
//!
//! Raw tokens are 32 random bytes, hex encoded. Only their SHA-256 hash is
//! persisted, and consumption is one atomic conditional update.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};

use auditrail_core::{AppError, AppResult};
use auditrail_domain::{ExportFormat, ExportJobId, ExportJobStatus};

use crate::audit_ports::Clock;
use crate::export_ports::{
    ArtifactStore, DownloadTokenRecord, DownloadTokenRepository, ExportJobRepository,
};

mod token_crypto;

use token_crypto::{generate_token, hash_token, is_well_formed_token};


/// Freshly issued token. The raw value is never stored by this service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedDownloadToken {
    /// Raw token handed to the requester.
    pub token: String,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
}

/// Artifact released by a successful token consumption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    /// Export job the artifact belongs to.
    pub job_id: ExportJobId,
    /// Rendered format.
    pub format: ExportFormat,
    /// MIME type.
    pub content_type: &'static str,
    /// Suggested download file name.
    pub file_name: String,
    /// Artifact content.
    pub bytes: Vec<u8>,
}

/// Issues and redeems download tokens.
#[derive(Clone)]
pub struct DownloadTokenService {
    token_repository: Arc<dyn DownloadTokenRepository>,
    job_repository: Arc<dyn ExportJobRepository>,
    artifact_store: Arc<dyn ArtifactStore>,
    clock: Arc<dyn Clock>,
    token_ttl: Duration,
}

impl DownloadTokenService {
    /// Creates a token service.
    #[must_use]
    pub fn new(
        token_repository: Arc<dyn DownloadTokenRepository>,
        job_repository: Arc<dyn ExportJobRepository>,
        artifact_store: Arc<dyn ArtifactStore>,
        clock: Arc<dyn Clock>,
        token_ttl: Duration,
    ) -> Self {
        Self {
            token_repository,
            job_repository,
            artifact_store,
            clock,
            token_ttl,
        }
    }

    /// Issues the download token of one completed job.
    pub async fn issue(&self, job_id: ExportJobId) -> AppResult<IssuedDownloadToken> {
        let (token, token_hash) = generate_token()?;
        let issued_at = self.clock.now();
        let expires_at = issued_at + self.token_ttl;

        self.token_repository
            .create_token(DownloadTokenRecord {
                job_id,
                token_hash,
                issued_at,
                expires_at,
                consumed_at: None,
            })
            .await?;

        Ok(IssuedDownloadToken { token, expires_at })
    }

    /// Redeems a token and returns the artifact it unlocks.
    ///
    /// Unknown, expired, and already consumed tokens all fail with the same
    /// `AppError::InvalidToken`.
    pub async fn consume_and_get_artifact(&self, raw_token: &str) -> AppResult<ExportArtifact> {
        let raw_token = raw_token.trim();
        if !is_well_formed_token(raw_token) {
            warn!("rejected malformed download token");
            return Err(AppError::InvalidToken);
        }

        let now = self.clock.now();
        let Some(job_id) = self
            .token_repository
            .consume_token(hash_token(raw_token).as_str(), now)
            .await?
        else {
            warn!("rejected unknown, expired, or consumed download token");
            return Err(AppError::InvalidToken);
        };

        let Some(job) = self
            .job_repository
            .find_job(job_id)
            .await?
            .filter(|job| job.status == ExportJobStatus::Completed)
        else {
            warn!(job_id = %job_id, "download token points at a job without an artifact");
            return Err(AppError::InvalidToken);
        };

        let Some(artifact) = job.artifact.as_ref() else {
            warn!(job_id = %job_id, "completed export job has no artifact");
            return Err(AppError::InvalidToken);
        };

        let Some(bytes) = self.artifact_store.get(artifact.location.as_str()).await? else {
            warn!(job_id = %job_id, "export artifact is no longer stored");
            return Err(AppError::InvalidToken);
        };

        info!(job_id = %job_id, size_bytes = bytes.len(), "export artifact downloaded");

        Ok(ExportArtifact {
            job_id,
            format: job.format,
            content_type: job.format.content_type(),
            file_name: format!(
                "audit-logs-{}{}",
                job.created_at.format("%Y-%m-%d"),
                job.format.file_extension()
            ),
            bytes,
        })
    }

    /// Deletes every token of one job.
    pub async fn revoke_for_job(&self, job_id: ExportJobId) -> AppResult<()> {
        self.token_repository.delete_tokens_for_job(job_id).await
    }
}
