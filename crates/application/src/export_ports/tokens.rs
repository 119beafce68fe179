use async_trait::async_trait;
use chrono::{DateTime, Utc};

use auditrail_core::AppResult;
use auditrail_domain::ExportJobId;

/// Download token row. Only the SHA-256 hash of the token is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTokenRecord {
    /// Job whose artifact the token unlocks.
    pub job_id: ExportJobId,
    /// Hex SHA-256 hash of the raw token.
    pub token_hash: String,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
    /// Consumption time, if consumed.
    pub consumed_at: Option<DateTime<Utc>>,
}

/// Repository port for download tokens.
#[async_trait]
pub trait DownloadTokenRepository: Send + Sync {
    /// Stores a freshly issued token.
    async fn create_token(&self, record: DownloadTokenRecord) -> AppResult<()>;

    /// Marks an unexpired, unconsumed token consumed and returns its job.
    ///
    /// Check and mark happen in one atomic step; concurrent callers with the
    /// same hash see at most one `Some`.
    async fn consume_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ExportJobId>>;

    /// Deletes every token of one job.
    async fn delete_tokens_for_job(&self, job_id: ExportJobId) -> AppResult<()>;
}
