//! IMAGE, VIDEO and AUDIO nodes.

use futures_util::future::BoxFuture;
use nodeflow_types::node::{MediaConfig, NodeConfig, NodeType};
use nodeflow_types::result::TokenUsage;
use serde_json::Value;

use crate::workflow::error::ProcessorError;
use crate::workflow::registry::{NodeContext, NodeOutput, NodeProcessor};

use super::{Prompt, complete, config_mismatch};

/// Collects media references and, when a prompt is configured, asks the
/// completion collaborator to analyse them.
pub struct MediaProcessor {
    node_type: NodeType,
}

impl MediaProcessor {
    pub fn new(node_type: NodeType) -> Self {
        Self { node_type }
    }

    fn media_kind(&self) -> &'static str {
        match self.node_type {
            NodeType::Image => "image",
            NodeType::Video => "video",
            _ => "audio",
        }
    }

    fn config<'c>(&self, ctx: &'c NodeContext<'_>) -> Result<&'c MediaConfig, ProcessorError> {
        match (&ctx.node.config, self.node_type) {
            (NodeConfig::Image(c), NodeType::Image)
            | (NodeConfig::Video(c), NodeType::Video)
            | (NodeConfig::Audio(c), NodeType::Audio) => Ok(c),
            _ => Err(config_mismatch(ctx, self.node_type)),
        }
    }
}

impl NodeProcessor for MediaProcessor {
    fn node_type(&self) -> NodeType {
        self.node_type
    }

    fn process<'a>(
        &'a self,
        ctx: &'a NodeContext<'a>,
    ) -> BoxFuture<'a, Result<NodeOutput, ProcessorError>> {
        Box::pin(async move {
            let config = self.config(ctx)?;
            let files: Vec<String> = config
                .files
                .iter()
                .map(|f| ctx.resolve(f))
                .filter(|f| !f.trim().is_empty())
                .collect();
            let files_value = Value::Array(files.iter().cloned().map(Value::String).collect());

            let Some(prompt) = config.prompt.as_deref().filter(|p| !p.trim().is_empty()) else {
                return Ok(NodeOutput::with_result(files_value.clone())
                    .insert("files", files_value)
                    .insert("mediaType", Value::from(self.media_kind())));
            };

            let mut user = ctx.resolve(prompt);
            if !files.is_empty() {
                user.push_str(&format!("\n\n{} files:\n", self.media_kind()));
                for file in &files {
                    user.push_str(&format!("- {file}\n"));
                }
            }

            let response = complete(
                ctx,
                Prompt {
                    system: config.system_prompt.as_deref().map(|s| ctx.resolve(s)),
                    user,
                    model: config.model.as_deref(),
                    temperature: None,
                    max_tokens: None,
                },
            )
            .await?;

            Ok(NodeOutput::with_result(Value::String(response.content))
                .insert("files", files_value)
                .insert("mediaType", Value::from(self.media_kind()))
                .tokens(Some(TokenUsage::from(response.usage))))
        })
    }
}
