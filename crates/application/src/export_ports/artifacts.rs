use async_trait::async_trait;

use auditrail_core::AppResult;
use auditrail_domain::{AuditLogEntry, ExportFormat, ExportJob, ExportJobId};

/// Storage port for rendered export artifacts.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persists one artifact and returns its opaque location.
    async fn put(
        &self,
        job_id: ExportJobId,
        format: ExportFormat,
        bytes: Vec<u8>,
    ) -> AppResult<String>;

    /// Loads one artifact, `None` once it has been purged.
    async fn get(&self, location: &str) -> AppResult<Option<Vec<u8>>>;

    /// Deletes one artifact. Missing artifacts are not an error.
    async fn delete(&self, location: &str) -> AppResult<()>;
}

/// Serializes already-redacted entries into one export format.
pub trait ExportRenderer: Send + Sync {
    /// Format produced by this renderer.
    fn format(&self) -> ExportFormat;

    /// Renders the full entry set of one job.
    fn render(&self, job: &ExportJob, entries: &[AuditLogEntry]) -> AppResult<Vec<u8>>;
}
