//! MERGE nodes: combine the outputs of direct predecessors.

use futures_util::future::BoxFuture;
use nodeflow_types::node::{MergeStrategy, NodeType};
use nodeflow_types::result::NodeResult;
use serde_json::{Map, Value};

use crate::workflow::error::ProcessorError;
use crate::workflow::registry::{NodeContext, NodeOutput, NodeProcessor};
use crate::workflow::template::humanize;

const DEFAULT_SEPARATOR: &str = "\n\n";

/// `object` and `array` combine each predecessor's `data` map; `concat`
/// joins their `result` text. Predecessors skipped by branching contribute
/// nothing.
pub struct MergeProcessor;

impl NodeProcessor for MergeProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Merge
    }

    fn process<'a>(
        &'a self,
        ctx: &'a NodeContext<'a>,
    ) -> BoxFuture<'a, Result<NodeOutput, ProcessorError>> {
        Box::pin(async move {
            let config = payload!(ctx, Merge);
            let inputs = ctx.predecessor_results();

            let merged = match config.strategy {
                MergeStrategy::Object => Value::Object(
                    inputs
                        .iter()
                        .map(|r| (r.node_name.clone(), Value::Object(r.data.clone())))
                        .collect::<Map<String, Value>>(),
                ),
                MergeStrategy::Array => Value::Array(
                    inputs
                        .iter()
                        .map(|r| Value::Object(r.data.clone()))
                        .collect(),
                ),
                MergeStrategy::Concat => {
                    let separator = config.separator.as_deref().unwrap_or(DEFAULT_SEPARATOR);
                    Value::String(
                        inputs
                            .iter()
                            .map(|r| humanize(&primary(r)))
                            .filter(|s| !s.is_empty())
                            .collect::<Vec<_>>()
                            .join(separator),
                    )
                }
            };

            Ok(NodeOutput::with_result(merged))
        })
    }
}

/// A node's `result`, or its whole data map when it has none.
fn primary(result: &NodeResult) -> Value {
    result
        .data
        .get("result")
        .cloned()
        .unwrap_or_else(|| Value::Object(result.data.clone()))
}
