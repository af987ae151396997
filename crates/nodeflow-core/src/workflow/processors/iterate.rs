//! LOOP nodes: map a template or a completion over a list.

use futures_util::future::BoxFuture;
use nodeflow_types::node::NodeType;
use nodeflow_types::result::TokenUsage;
use serde_json::{Value, json};

use crate::workflow::error::ProcessorError;
use crate::workflow::registry::{NodeContext, NodeOutput, NodeProcessor};
use crate::workflow::template::OverlayScope;

use super::{Prompt, complete};

/// Iterates `items` in order. Each iteration sees `{{loop.item}}`,
/// `{{loop.item.<path>}}` and `{{loop.index}}` on top of the run scope.
pub struct LoopProcessor;

impl NodeProcessor for LoopProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Loop
    }

    fn process<'a>(
        &'a self,
        ctx: &'a NodeContext<'a>,
    ) -> BoxFuture<'a, Result<NodeOutput, ProcessorError>> {
        Box::pin(async move {
            let config = payload!(ctx, Loop);
            let items = items_of(ctx.resolve_value(&config.items))?;
            if items.len() > config.max_iterations {
                return Err(ProcessorError::Fatal(format!(
                    "loop has {} items, more than the limit of {}",
                    items.len(),
                    config.max_iterations
                )));
            }

            let mut results = Vec::with_capacity(items.len());
            let mut usage: Option<TokenUsage> = None;

            for (index, item) in items.into_iter().enumerate() {
                if ctx.exec.cancellation().is_cancelled() {
                    return Err(ProcessorError::Cancelled);
                }
                let state = json!({"item": item, "index": index});

                let value = if let Some(user_prompt) = config.user_prompt.as_deref() {
                    // Resolve everything up front; the overlay borrows `state`.
                    let (system, user) = {
                        let scope = OverlayScope::new(ctx.exec, "loop", state.clone());
                        (
                            config
                                .system_prompt
                                .as_deref()
                                .map(|s| ctx.resolve_in(s, &scope)),
                            ctx.resolve_in(user_prompt, &scope),
                        )
                    };
                    let response = complete(
                        ctx,
                        Prompt {
                            system,
                            user,
                            model: config.model.as_deref(),
                            temperature: None,
                            max_tokens: None,
                        },
                    )
                    .await?;
                    usage
                        .get_or_insert_with(TokenUsage::default)
                        .accumulate(&TokenUsage::from(response.usage));
                    Value::String(response.content)
                } else if let Some(template) = config.item_template.as_deref() {
                    let scope = OverlayScope::new(ctx.exec, "loop", state.clone());
                    Value::String(ctx.resolve_in(template, &scope))
                } else {
                    state["item"].clone()
                };
                results.push(value);
            }

            let count = results.len();
            Ok(NodeOutput::with_result(Value::Array(results))
                .insert("count", Value::from(count))
                .tokens(usage))
        })
    }
}

/// Accept an array, or text holding a JSON array.
fn items_of(value: Value) -> Result<Vec<Value>, ProcessorError> {
    match value {
        Value::Array(items) => Ok(items),
        Value::String(text) => match serde_json::from_str::<Value>(text.trim()) {
            Ok(Value::Array(items)) => Ok(items),
            _ => Err(ProcessorError::Fatal(format!(
                "loop items must be an array, got '{}'",
                text.chars().take(80).collect::<String>()
            ))),
        },
        Value::Null => Ok(Vec::new()),
        other => Err(ProcessorError::Fatal(format!(
            "loop items must be an array, got {other}"
        ))),
    }
}
