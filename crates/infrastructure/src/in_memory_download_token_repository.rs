use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use auditrail_application::{DownloadTokenRecord, DownloadTokenRepository};
use auditrail_core::{AppError, AppResult};
use auditrail_domain::ExportJobId;

/// In-memory download token table keyed by token hash.
#[derive(Debug, Default)]
pub struct InMemoryDownloadTokenRepository {
    tokens: Mutex<HashMap<String, DownloadTokenRecord>>,
}

impl InMemoryDownloadTokenRepository {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DownloadTokenRepository for InMemoryDownloadTokenRepository {
    async fn create_token(&self, record: DownloadTokenRecord) -> AppResult<()> {
        let mut tokens = self.tokens.lock().await;
        if tokens.contains_key(&record.token_hash) {
            return Err(AppError::Conflict(
                "download token hash already exists".to_owned(),
            ));
        }

        tokens.insert(record.token_hash.clone(), record);
        Ok(())
    }

    async fn consume_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Option<ExportJobId>> {
        let mut tokens = self.tokens.lock().await;
        let Some(record) = tokens.get_mut(token_hash) else {
            return Ok(None);
        };

        if record.consumed_at.is_some() || record.expires_at <= now {
            return Ok(None);
        }

        record.consumed_at = Some(now);
        Ok(Some(record.job_id))
    }

    async fn delete_tokens_for_job(&self, job_id: ExportJobId) -> AppResult<()> {
        self.tokens
            .lock()
            .await
            .retain(|_, record| record.job_id != job_id);
        Ok(())
    }
}
