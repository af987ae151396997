//! Built-in node processors, one module per node family.
//!
//! Every processor reads its own payload from `ctx.node.config`, resolves
//! its string fields at execution time, does its work through the
//! collaborators in [`ProcessorServices`](super::registry::ProcessorServices),
//! and returns a [`NodeOutput`](super::registry::NodeOutput) whose primary
//! value sits under `result`.

/// Borrow the payload for `$variant`, or fail with a config mismatch.
///
/// Declared ahead of the submodules so it is in textual scope for each.
macro_rules! payload {
    ($ctx:expr, $variant:ident) => {
        match &$ctx.node.config {
            nodeflow_types::node::NodeConfig::$variant(config) => config,
            _ => {
                return Err($crate::workflow::processors::config_mismatch(
                    $ctx,
                    nodeflow_types::node::NodeType::$variant,
                ))
            }
        }
    };
}

pub mod ai;
pub mod branch;
pub mod code;
pub mod data;
pub mod http;
pub mod input;
pub mod iterate;
pub mod media;
pub mod merge;
pub mod notify;
pub mod output;

use nodeflow_types::llm::{CompletionRequest, CompletionResponse, Message};
use nodeflow_types::node::NodeType;
use tracing::{Instrument, info_span};

use super::error::ProcessorError;
use super::registry::NodeContext;

/// Error for a node whose payload does not match the processor.
pub(crate) fn config_mismatch(ctx: &NodeContext<'_>, expected: NodeType) -> ProcessorError {
    ProcessorError::InvalidConfig(format!(
        "node '{}' has {} config, expected {}",
        ctx.node.name,
        ctx.node.config.node_type(),
        expected
    ))
}

/// Completion parameters after template resolution.
pub(crate) struct Prompt<'p> {
    pub system: Option<String>,
    pub user: String,
    pub model: Option<&'p str>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// Call the completion collaborator, filling gaps from the run's AI defaults.
pub(crate) async fn complete(
    ctx: &NodeContext<'_>,
    prompt: Prompt<'_>,
) -> Result<CompletionResponse, ProcessorError> {
    let llm = ctx.services.llm()?;
    let defaults = ctx.exec.ai_config();
    let request = CompletionRequest {
        model: prompt
            .model
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&defaults.default_model)
            .to_string(),
        messages: vec![Message::user(prompt.user)],
        system: prompt.system.filter(|s| !s.trim().is_empty()),
        max_tokens: prompt.max_tokens.or(defaults.max_tokens),
        temperature: prompt.temperature.or(defaults.temperature),
    };

    let span = info_span!(
        "gen_ai.complete",
        gen_ai.system = llm.name(),
        gen_ai.request.model = %request.model,
        gen_ai.request.max_tokens = request.max_tokens,
        gen_ai.request.temperature = ?request.temperature,
        node = %ctx.node.name,
    );
    let response = llm.complete(&request).instrument(span).await?;
    tracing::debug!(
        node = %ctx.node.name,
        input_tokens = response.usage.input_tokens,
        output_tokens = response.usage.output_tokens,
        "completion received"
    );
    Ok(response)
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use nodeflow_types::node::NodeDefinition;
    use nodeflow_types::workflow::WorkflowDefinition;
    use serde_json::{Map, Value, json};
    use tokio::time::{Duration, Instant};
    use uuid::Uuid;

    use crate::workflow::context::ExecutionContext;
    use crate::workflow::context::tests::success;
    use crate::workflow::error::ProcessorError;
    use crate::workflow::graph::WorkflowGraph;
    use crate::workflow::registry::{NodeContext, NodeOutput, NodeProcessor, ProcessorServices};

    pub(crate) fn node(name: &str, node_type: &str, config: Value) -> NodeDefinition {
        serde_json::from_value(json!({
            "id": format!("{name}-id"),
            "name": name,
            "type": node_type,
            "config": config
        }))
        .unwrap()
    }

    /// Context with global `company = "Acme"` and the given invocation input.
    pub(crate) fn context_with_input(input: Value) -> ExecutionContext {
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "name": "processor-test",
            "nodes": [],
            "globalVariables": {"company": "Acme"}
        }))
        .unwrap();
        let Value::Object(input) = input else {
            panic!("input must be an object");
        };
        ExecutionContext::new(
            Uuid::now_v7(),
            &def,
            input,
            Instant::now() + Duration::from_secs(30),
        )
    }

    /// Record a successful upstream node named `name`.
    pub(crate) fn upstream(mut exec: ExecutionContext, name: &str, data: Value) -> ExecutionContext {
        exec.record_output(Arc::new(success(name, data))).unwrap();
        exec
    }

    pub(crate) async fn run(
        processor: &dyn NodeProcessor,
        node: &NodeDefinition,
        exec: &ExecutionContext,
    ) -> Result<NodeOutput, ProcessorError> {
        run_with(processor, node, exec, &ProcessorServices::default()).await
    }

    pub(crate) async fn run_with(
        processor: &dyn NodeProcessor,
        node: &NodeDefinition,
        exec: &ExecutionContext,
        services: &ProcessorServices,
    ) -> Result<NodeOutput, ProcessorError> {
        let graph = graph_for(node, exec);
        let ctx = NodeContext::new(node, exec, &graph, services);
        processor.process(&ctx).await
    }

    /// A graph where every recorded output is a direct predecessor of `node`.
    fn graph_for(node: &NodeDefinition, exec: &ExecutionContext) -> WorkflowGraph {
        let mut nodes: Vec<Value> = exec
            .outputs()
            .iter()
            .map(|r| json!({"id": r.node_id, "name": r.node_name, "type": "INPUT"}))
            .collect();
        let edges: Vec<Value> = exec
            .outputs()
            .iter()
            .enumerate()
            .map(|(i, r)| json!({"id": format!("e{i}"), "source": r.node_id, "target": node.id}))
            .collect();
        nodes.push(serde_json::to_value(node).unwrap());
        let globals: Map<String, Value> = exec.global_variables().clone();
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "nodes": nodes,
            "edges": edges,
            "globalVariables": globals
        }))
        .unwrap();
        WorkflowGraph::build(&def).unwrap()
    }
}
