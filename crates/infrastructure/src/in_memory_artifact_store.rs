use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use auditrail_application::ArtifactStore;
use auditrail_core::AppResult;
use auditrail_domain::{ExportFormat, ExportJobId};

/// In-memory artifact store for the memory backend.
#[derive(Debug, Default)]
pub struct InMemoryArtifactStore {
    artifacts: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryArtifactStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    async fn put(
        &self,
        job_id: ExportJobId,
        format: ExportFormat,
        bytes: Vec<u8>,
    ) -> AppResult<String> {
        let location = format!("memory://{job_id}{}", format.file_extension());
        self.artifacts.write().await.insert(location.clone(), bytes);
        Ok(location)
    }

    async fn get(&self, location: &str) -> AppResult<Option<Vec<u8>>> {
        Ok(self.artifacts.read().await.get(location).cloned())
    }

    async fn delete(&self, location: &str) -> AppResult<()> {
        self.artifacts.write().await.remove(location);
        Ok(())
    }
}
