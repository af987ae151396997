//! INPUT nodes: the run's entry payload.

use futures_util::future::BoxFuture;
use nodeflow_types::node::NodeType;
use serde_json::{Map, Value};

use crate::workflow::error::ProcessorError;
use crate::workflow::registry::{NodeContext, NodeOutput, NodeProcessor};

/// Emits one key per declared field.
///
/// A field takes the invocation input of the same name when the caller
/// supplied one, otherwise its configured value. Either way templates are
/// resolved, so values can reference global variables.
pub struct InputProcessor;

impl NodeProcessor for InputProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Input
    }

    fn process<'a>(
        &'a self,
        ctx: &'a NodeContext<'a>,
    ) -> BoxFuture<'a, Result<NodeOutput, ProcessorError>> {
        Box::pin(async move {
            let config = payload!(ctx, Input);
            let mut fields = Map::new();

            for field in &config.fields {
                let raw = ctx.exec.input().get(&field.name).unwrap_or(&field.value);
                let value = ctx.resolve_json(raw);
                if field.required && is_blank(&value) {
                    return Err(ProcessorError::InvalidConfig(format!(
                        "required input field '{}' is empty",
                        field.name
                    )));
                }
                fields.insert(field.name.clone(), value);
            }

            let mut output = NodeOutput::with_result(Value::Object(fields.clone()));
            for (name, value) in fields {
                // `result` stays the aggregate even if a field shares the name.
                if name != "result" {
                    output = output.insert(&name, value);
                }
            }
            Ok(output)
        })
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}
