//! PROCESS nodes: one AI completion, optionally knowledge-augmented.

use futures_util::future::BoxFuture;
use nodeflow_types::node::{NodeType, ResponseFormat};
use nodeflow_types::result::TokenUsage;
use serde_json::Value;

use crate::workflow::error::ProcessorError;
use crate::workflow::registry::{NodeContext, NodeOutput, NodeProcessor};
use crate::workflow::retrieval;

use super::{Prompt, complete};

pub struct AiProcessor;

impl NodeProcessor for AiProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Process
    }

    fn process<'a>(
        &'a self,
        ctx: &'a NodeContext<'a>,
    ) -> BoxFuture<'a, Result<NodeOutput, ProcessorError>> {
        Box::pin(async move {
            let config = payload!(ctx, Process);

            let user = ctx.resolve(&config.user_prompt);
            if user.trim().is_empty() {
                return Err(ProcessorError::InvalidConfig(
                    "user prompt resolved to an empty string".into(),
                ));
            }
            let mut system = config.system_prompt.as_deref().map(|s| ctx.resolve(s));

            let mut citations = Vec::new();
            if let Some(kb_id) = config.knowledge_base_id.as_deref().filter(|id| !id.is_empty()) {
                let retriever = ctx.services.retriever.as_deref().ok_or_else(|| {
                    ProcessorError::InvalidConfig(format!(
                        "node references knowledge base '{kb_id}' but no retriever is configured"
                    ))
                })?;
                let rag = config
                    .rag_config
                    .clone()
                    .unwrap_or_else(|| ctx.exec.knowledge_config().defaults.clone());
                let augmented =
                    retrieval::augment(retriever, kb_id, &user, &rag, system.as_deref()).await?;
                system = augmented.system_prompt;
                citations = augmented.citations;
            }

            let response = complete(
                ctx,
                Prompt {
                    system,
                    user,
                    model: config.model.as_deref(),
                    temperature: config.temperature,
                    max_tokens: config.max_tokens,
                },
            )
            .await?;

            let usage = TokenUsage::from(response.usage);
            let mut output = NodeOutput::with_result(Value::String(response.content.clone()))
                .insert("model", Value::String(response.model))
                .tokens(Some(usage));

            if config.output_format == ResponseFormat::Json {
                let parsed = parse_json_reply(&response.content).ok_or_else(|| {
                    ProcessorError::Transient("completion is not valid JSON".into())
                })?;
                output = output.insert("parsed", parsed);
            }
            if !citations.is_empty() {
                output = output.insert(
                    "citations",
                    serde_json::to_value(&citations)
                        .map_err(|e| ProcessorError::Fatal(e.to_string()))?,
                );
            }
            Ok(output)
        })
    }
}

/// Parse a JSON reply, tolerating a surrounding Markdown code fence.
fn parse_json_reply(content: &str) -> Option<Value> {
    let trimmed = content.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).ok()
}
