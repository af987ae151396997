//! Knowledge retrieval trait.
//!
//! The vector-retrieval collaborator behind retrieval-augmented nodes.
//! Uses RPITIT; wrap in [`super::box_retriever::BoxKnowledgeRetriever`] for
//! dynamic dispatch.

use std::future::Future;

use nodeflow_types::error::RepositoryError;
use nodeflow_types::knowledge::RankedChunk;

pub trait KnowledgeRetriever: Send + Sync {
    /// Return up to `top_k` chunks of knowledge base `kb_id` ranked by
    /// similarity to `query`.
    ///
    /// `threshold` is a hint; callers still filter what comes back.
    fn retrieve(
        &self,
        kb_id: &str,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> impl Future<Output = Result<Vec<RankedChunk>, RepositoryError>> + Send;
}
