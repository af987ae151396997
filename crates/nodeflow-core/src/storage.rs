//! Artifact storage collaborator for OUTPUT nodes.

use futures_util::future::BoxFuture;
use nodeflow_types::error::RepositoryError;
use nodeflow_types::storage::{ArtifactMetadata, StoredArtifact};

pub trait ArtifactStore: Send + Sync {
    /// Persist `content` and return where it can be fetched from.
    fn store<'a>(
        &'a self,
        content: &'a [u8],
        metadata: &'a ArtifactMetadata,
    ) -> BoxFuture<'a, Result<StoredArtifact, RepositoryError>>;
}
