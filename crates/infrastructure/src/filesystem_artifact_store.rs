use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::warn;

use auditrail_application::ArtifactStore;
use auditrail_core::{AppError, AppResult};
use auditrail_domain::{ExportFormat, ExportJobId};

/// Artifact store writing one file per job under a root directory.
///
/// Locations are bare file names relative to the root, so a stored location
/// can never address a path outside it.
#[derive(Debug, Clone)]
pub struct FilesystemArtifactStore {
    root: PathBuf,
}

impl FilesystemArtifactStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.root.as_path()
    }

    fn resolve(&self, location: &str) -> AppResult<PathBuf> {
        let is_plain_name = !location.is_empty()
            && !location.starts_with('.')
            && location.chars().all(|character| {
                character.is_ascii_alphanumeric() || matches!(character, '-' | '.')
            });
        if !is_plain_name {
            return Err(AppError::Validation(format!(
                "invalid artifact location '{location}'"
            )));
        }

        Ok(self.root.join(location))
    }
}

#[async_trait]
impl ArtifactStore for FilesystemArtifactStore {
    async fn put(
        &self,
        job_id: ExportJobId,
        format: ExportFormat,
        bytes: Vec<u8>,
    ) -> AppResult<String> {
        tokio::fs::create_dir_all(&self.root).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to create export directory '{}': {error}",
                self.root.display()
            ))
        })?;

        let location = format!("{job_id}{}", format.file_extension());
        let path = self.resolve(location.as_str())?;
        let partial_path = self.root.join(format!("{job_id}.partial"));

        tokio::fs::write(&partial_path, bytes).await.map_err(|error| {
            AppError::Internal(format!(
                "failed to write export artifact for job '{job_id}': {error}"
            ))
        })?;
        if let Err(error) = tokio::fs::rename(&partial_path, &path).await {
            if let Err(cleanup_error) = tokio::fs::remove_file(&partial_path).await {
                warn!(
                    job_id = %job_id,
                    path = %partial_path.display(),
                    error = %cleanup_error,
                    "failed to remove partial export artifact"
                );
            }
            return Err(AppError::Internal(format!(
                "failed to publish export artifact for job '{job_id}': {error}"
            )));
        }

        Ok(location)
    }

    async fn get(&self, location: &str) -> AppResult<Option<Vec<u8>>> {
        let path = self.resolve(location)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(AppError::Internal(format!(
                "failed to read export artifact '{location}': {error}"
            ))),
        }
    }

    async fn delete(&self, location: &str) -> AppResult<()> {
        let path = self.resolve(location)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(AppError::Internal(format!(
                "failed to delete export artifact '{location}': {error}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use auditrail_application::ArtifactStore;
    use auditrail_core::AppError;
    use auditrail_domain::{ExportFormat, ExportJobId};

    use super::FilesystemArtifactStore;

    #[tokio::test]
    async fn artifacts_round_trip_and_delete_is_idempotent() {
        let directory = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let store = FilesystemArtifactStore::new(directory.path().join("exports"));
        let job_id = ExportJobId::new();

        let location = store
            .put(job_id, ExportFormat::Json, b"[]".to_vec())
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(location, format!("{job_id}.json"));
        assert_eq!(
            store.get(location.as_str()).await.ok().flatten(),
            Some(b"[]".to_vec())
        );
        assert!(store.delete(location.as_str()).await.is_ok());
        assert!(store.delete(location.as_str()).await.is_ok());
        assert_eq!(store.get(location.as_str()).await.ok().flatten(), None);
    }

    #[tokio::test]
    async fn locations_outside_the_root_are_rejected() {
        let directory = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let store = FilesystemArtifactStore::new(directory.path());

        for location in ["../secrets.csv", "/etc/passwd", "", ".hidden"] {
            let result = store.get(location).await;
            assert!(matches!(result, Err(AppError::Validation(_))));
        }
    }
}
