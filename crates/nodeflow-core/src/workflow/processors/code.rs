//! CODE nodes: user code run by the sandbox collaborator.

use std::collections::BTreeMap;

use futures_util::future::BoxFuture;
use nodeflow_types::node::NodeType;
use serde_json::Value;

use crate::sandbox::SandboxRequest;
use crate::workflow::error::ProcessorError;
use crate::workflow::registry::{NodeContext, NodeOutput, NodeProcessor};

/// Resolves the declared inputs and hands the code to the sandbox.
///
/// Resource caps (log lines, output size, wall time) are enforced by the
/// sandbox itself.
pub struct CodeProcessor;

impl NodeProcessor for CodeProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Code
    }

    fn process<'a>(
        &'a self,
        ctx: &'a NodeContext<'a>,
    ) -> BoxFuture<'a, Result<NodeOutput, ProcessorError>> {
        Box::pin(async move {
            let config = payload!(ctx, Code);
            if config.code.trim().is_empty() {
                return Err(ProcessorError::InvalidConfig("code is empty".into()));
            }
            let sandbox = ctx.services.sandbox()?;

            let inputs: BTreeMap<String, Value> = config
                .inputs
                .iter()
                .map(|(name, template)| (name.clone(), ctx.resolve_value(template)))
                .collect();

            let request = SandboxRequest {
                language: config.language,
                code: config.code.clone(),
                inputs,
                timeout_secs: config.timeout_seconds,
            };

            tracing::debug!(
                node = %ctx.node.name,
                language = config.language.as_str(),
                "executing code"
            );
            let output = sandbox.execute(&request).await?;

            Ok(NodeOutput::with_result(output.result).insert(
                "logs",
                Value::Array(output.logs.into_iter().map(Value::String).collect()),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::sandbox::{CodeSandbox, SandboxError, SandboxOutput};
    use crate::workflow::processors::tests::{context_with_input, node, run_with, upstream};
    use crate::workflow::registry::ProcessorServices;
    use serde_json::json;

    /// Echoes its inputs back as the result.
    struct EchoSandbox;

    impl CodeSandbox for EchoSandbox {
        fn execute<'a>(
            &'a self,
            request: &'a SandboxRequest,
        ) -> BoxFuture<'a, Result<SandboxOutput, SandboxError>> {
            Box::pin(async move {
                if request.code.contains("import os") {
                    return Err(SandboxError::SecurityViolation("os".into()));
                }
                Ok(SandboxOutput {
                    result: serde_json::to_value(&request.inputs).unwrap(),
                    logs: vec!["ran".into()],
                })
            })
        }
    }

    fn services() -> ProcessorServices {
        ProcessorServices::new().with_sandbox(Arc::new(EchoSandbox))
    }

    #[tokio::test]
    async fn typed_inputs_reach_sandbox() {
        let exec = upstream(
            context_with_input(json!({})),
            "数据",
            json!({"result": [1, 2, 3]}),
        );
        let node = node(
            "计算",
            "CODE",
            json!({
                "language": "python",
                "code": "result = sum(items)",
                "inputs": {"items": "{{数据.result}}", "label": "n={{数据.result}}"}
            }),
        );
        let output = run_with(&CodeProcessor, &node, &exec, &services())
            .await
            .unwrap();
        assert_eq!(output.data["result"]["items"], json!([1, 2, 3]));
        assert_eq!(output.data["result"]["label"], "n=1, 2, 3");
        assert_eq!(output.data["logs"], json!(["ran"]));
    }

    #[tokio::test]
    async fn security_violation_is_not_retryable() {
        let node = node(
            "c",
            "CODE",
            json!({"language": "python", "code": "import os"}),
        );
        let err = run_with(&CodeProcessor, &node, &context_with_input(json!({})), &services())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::SecurityViolation(_)));
        assert!(!err.is_retryable());
    }
}
