//! HTTP client for an external knowledge retrieval service.
//!
//! Protocol: `POST {endpoint}/retrieve` with
//! `{"knowledgeBaseId", "query", "topK", "threshold"}`, answered by
//! `{"chunks": [{"documentName", "content", "similarity", "chunkIndex"}]}`.

use nodeflow_core::knowledge::retriever::KnowledgeRetriever;
use nodeflow_types::error::RepositoryError;
use nodeflow_types::knowledge::RankedChunk;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RetrieveRequest<'a> {
    knowledge_base_id: &'a str,
    query: &'a str,
    top_k: usize,
    threshold: f32,
}

#[derive(Debug, Deserialize)]
struct RetrieveResponse {
    #[serde(default)]
    chunks: Vec<RankedChunk>,
}

#[derive(Debug, Clone)]
pub struct HttpKnowledgeRetriever {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpKnowledgeRetriever {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self) -> String {
        format!("{}/retrieve", self.endpoint)
    }
}

impl KnowledgeRetriever for HttpKnowledgeRetriever {
    async fn retrieve(
        &self,
        kb_id: &str,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<RankedChunk>, RepositoryError> {
        let body = RetrieveRequest {
            knowledge_base_id: kb_id,
            query,
            top_k,
            threshold,
        };
        let response = self
            .client
            .post(self.url())
            .json(&body)
            .send()
            .await
            .map_err(|e| RepositoryError::Connection(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RepositoryError::NotFound);
        }
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(RepositoryError::Connection(format!(
                "retrieval service returned {status}"
            )));
        }
        if !status.is_success() {
            return Err(RepositoryError::Query(format!(
                "retrieval service returned {status}"
            )));
        }

        let parsed: RetrieveResponse = response
            .json()
            .await
            .map_err(|e| RepositoryError::Query(format!("invalid retrieval response: {e}")))?;
        tracing::debug!(kb_id, chunks = parsed.chunks.len(), "knowledge retrieved");
        Ok(parsed.chunks)
    }
}
