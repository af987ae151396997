//! BoxKnowledgeRetriever -- object-safe dynamic dispatch wrapper for
//! KnowledgeRetriever, built the same way as `BoxLlmProvider`.

use std::future::Future;
use std::pin::Pin;

use nodeflow_types::error::RepositoryError;
use nodeflow_types::knowledge::RankedChunk;

use super::retriever::KnowledgeRetriever;

pub trait KnowledgeRetrieverDyn: Send + Sync {
    fn retrieve_boxed<'a>(
        &'a self,
        kb_id: &'a str,
        query: &'a str,
        top_k: usize,
        threshold: f32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RankedChunk>, RepositoryError>> + Send + 'a>>;
}

impl<T: KnowledgeRetriever> KnowledgeRetrieverDyn for T {
    fn retrieve_boxed<'a>(
        &'a self,
        kb_id: &'a str,
        query: &'a str,
        top_k: usize,
        threshold: f32,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<RankedChunk>, RepositoryError>> + Send + 'a>>
    {
        Box::pin(self.retrieve(kb_id, query, top_k, threshold))
    }
}

/// Type-erased knowledge retriever.
pub struct BoxKnowledgeRetriever {
    inner: Box<dyn KnowledgeRetrieverDyn + Send + Sync>,
}

impl BoxKnowledgeRetriever {
    pub fn new<T: KnowledgeRetriever + 'static>(retriever: T) -> Self {
        Self {
            inner: Box::new(retriever),
        }
    }

    pub async fn retrieve(
        &self,
        kb_id: &str,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<RankedChunk>, RepositoryError> {
        self.inner
            .retrieve_boxed(kb_id, query, top_k, threshold)
            .await
    }
}
