//! Local filesystem artifact store.
//!
//! OUTPUT artifacts are written to `{base_dir}/{run_id}/{file_name}` and
//! addressed by `file://` URLs.

use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use nodeflow_core::storage::ArtifactStore;
use nodeflow_types::error::RepositoryError;
use nodeflow_types::storage::{ArtifactMetadata, MAX_ARTIFACT_SIZE_BYTES, StoredArtifact};

#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    base_dir: PathBuf,
}

impl LocalArtifactStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Target path; only the final component of `file_name` is used.
    fn artifact_path(&self, metadata: &ArtifactMetadata) -> Result<PathBuf, RepositoryError> {
        let name = Path::new(&metadata.file_name)
            .file_name()
            .ok_or_else(|| {
                RepositoryError::Query(format!("invalid file name '{}'", metadata.file_name))
            })?;
        Ok(self
            .base_dir
            .join(metadata.run_id.to_string())
            .join(name))
    }

    async fn write(
        &self,
        content: &[u8],
        metadata: &ArtifactMetadata,
    ) -> Result<StoredArtifact, RepositoryError> {
        if content.len() as u64 > MAX_ARTIFACT_SIZE_BYTES {
            return Err(RepositoryError::Conflict(format!(
                "artifact '{}' is {} bytes, limit is {MAX_ARTIFACT_SIZE_BYTES}",
                metadata.file_name,
                content.len()
            )));
        }

        let path = self.artifact_path(metadata)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| RepositoryError::Connection(format!("create {}: {e}", dir.display())))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| RepositoryError::Connection(format!("write {}: {e}", path.display())))?;

        tracing::debug!(
            run_id = %metadata.run_id,
            node_id = %metadata.node_id,
            path = %path.display(),
            bytes = content.len(),
            "artifact stored"
        );
        Ok(StoredArtifact {
            url: format!("file://{}", path.display()),
            size: content.len() as u64,
        })
    }
}

impl ArtifactStore for LocalArtifactStore {
    fn store<'a>(
        &'a self,
        content: &'a [u8],
        metadata: &'a ArtifactMetadata,
    ) -> BoxFuture<'a, Result<StoredArtifact, RepositoryError>> {
        Box::pin(self.write(content, metadata))
    }
}
