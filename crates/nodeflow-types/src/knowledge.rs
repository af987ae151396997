//! Knowledge-base retrieval types.

use serde::{Deserialize, Serialize};

/// Retrieval tuning for a retrieval-augmented node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RagConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum similarity in `[0, 1]`; weaker chunks are dropped.
    #[serde(default = "default_threshold")]
    pub threshold: f32,
    /// Budget for injected context, in estimated tokens.
    #[serde(default = "default_max_context_tokens")]
    pub max_context_tokens: usize,
}

fn default_top_k() -> usize {
    5
}

fn default_threshold() -> f32 {
    0.7
}

fn default_max_context_tokens() -> usize {
    2000
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            threshold: default_threshold(),
            max_context_tokens: default_max_context_tokens(),
        }
    }
}

/// A retrieved passage with its similarity to the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedChunk {
    pub document_name: String,
    pub content: String,
    pub similarity: f32,
    #[serde(default)]
    pub chunk_index: u32,
}

/// Resolved knowledge defaults for one run, snapshotted at run start.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Whether a retrieval collaborator is available at all.
    pub enabled: bool,
    pub defaults: RagConfig,
}
