//! Artifact storage types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Metadata handed to the storage collaborator alongside the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactMetadata {
    pub run_id: Uuid,
    pub node_id: String,
    pub file_name: String,
    pub mime_type: String,
}

/// Where the storage collaborator put an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredArtifact {
    pub url: String,
    pub size: u64,
}

/// A file generated by an OUTPUT node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputFile {
    pub node_id: String,
    pub node_name: String,
    pub file_name: String,
    pub url: String,
    pub size: u64,
    pub mime_type: String,
}

/// Maximum artifact size accepted by storage collaborators (50 MiB).
pub const MAX_ARTIFACT_SIZE_BYTES: u64 = 50 * 1024 * 1024;
