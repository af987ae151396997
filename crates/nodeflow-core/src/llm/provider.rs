//! LLM provider trait.
//!
//! Uses native async fn in traits (RPITIT, Rust 2024). Not object-safe; use
//! [`super::box_provider::BoxLlmProvider`] for dynamic dispatch.

use std::future::Future;

use nodeflow_types::llm::{CompletionRequest, CompletionResponse, LlmError};

/// The AI completion collaborator.
///
/// Implementations must classify failures: rate limits, overload and network
/// errors as transient [`LlmError`] variants; bad requests and credentials
/// as fatal ones.
pub trait LlmProvider: Send + Sync {
    /// Human-readable provider name (e.g. "openai").
    fn name(&self) -> &str;

    /// Send a completion request and wait for the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl Future<Output = Result<CompletionResponse, LlmError>> + Send;
}
