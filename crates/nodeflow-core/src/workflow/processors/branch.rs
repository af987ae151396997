//! CONDITION and SWITCH nodes.
//!
//! Both evaluate a JEXL expression against the run's expression context and
//! select one outgoing handle. The orchestrator deactivates edges whose
//! `sourceHandle` does not match the selected branch.

use futures_util::future::BoxFuture;
use nodeflow_types::node::{NodeType, SwitchConfig};
use serde_json::Value;

use crate::workflow::error::ProcessorError;
use crate::workflow::expression::{ExpressionEvaluator, loosely_equal};
use crate::workflow::registry::{NodeContext, NodeOutput, NodeProcessor};

pub struct ConditionProcessor;

impl NodeProcessor for ConditionProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Condition
    }

    fn process<'a>(
        &'a self,
        ctx: &'a NodeContext<'a>,
    ) -> BoxFuture<'a, Result<NodeOutput, ProcessorError>> {
        Box::pin(async move {
            let config = payload!(ctx, Condition);
            let value = evaluate(&config.expression, &ctx.exec.expression_context())?;
            let taken = ExpressionEvaluator::value_to_bool(&value);
            let handle = if taken { "true" } else { "false" };

            tracing::debug!(node = %ctx.node.name, branch = handle, "condition evaluated");
            Ok(NodeOutput::with_result(Value::Bool(taken))
                .insert("branch", Value::from(handle))
                .branch(handle))
        })
    }
}

pub struct SwitchProcessor;

impl NodeProcessor for SwitchProcessor {
    fn node_type(&self) -> NodeType {
        NodeType::Switch
    }

    fn process<'a>(
        &'a self,
        ctx: &'a NodeContext<'a>,
    ) -> BoxFuture<'a, Result<NodeOutput, ProcessorError>> {
        Box::pin(async move {
            let config = payload!(ctx, Switch);
            let value = evaluate(&config.expression, &ctx.exec.expression_context())?;
            let handle = select_case(config, &value).to_string();

            tracing::debug!(node = %ctx.node.name, branch = %handle, "switch evaluated");
            Ok(NodeOutput::with_result(value)
                .insert("branch", Value::from(handle.as_str()))
                .branch(handle))
        })
    }
}

/// The evaluator is built per call and never held across an await.
fn evaluate(expression: &str, context: &Value) -> Result<Value, ProcessorError> {
    Ok(ExpressionEvaluator::new().evaluate_value(expression, context)?)
}

fn select_case<'c>(config: &'c SwitchConfig, value: &Value) -> &'c str {
    config
        .cases
        .iter()
        .find(|case| loosely_equal(&case.value, value))
        .map_or(config.default_handle.as_str(), |case| case.handle.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::processors::tests::{context_with_input, node, run, upstream};
    use serde_json::json;

    #[tokio::test]
    async fn condition_selects_branch() {
        let exec = upstream(context_with_input(json!({})), "score", json!({"result": 91}));
        let node = node("够高", "CONDITION", json!({"expression": "score.result > 80"}));
        let output = run(&ConditionProcessor, &node, &exec).await.unwrap();
        assert_eq!(output.branch.as_deref(), Some("true"));
        assert_eq!(output.data["result"], true);
    }

    #[tokio::test]
    async fn condition_on_input() {
        let exec = context_with_input(json!({"vip": false}));
        let node = node("vip?", "CONDITION", json!({"expression": "input.vip"}));
        let output = run(&ConditionProcessor, &node, &exec).await.unwrap();
        assert_eq!(output.branch.as_deref(), Some("false"));
    }

    #[tokio::test]
    async fn switch_matches_case_or_default() {
        let exec = upstream(context_with_input(json!({})), "分类", json!({"result": "Billing"}));
        let config = json!({
            "expression": "nodes['分类'].result|lower",
            "cases": [
                {"value": "tech", "handle": "tech"},
                {"value": "billing", "handle": "money"}
            ]
        });
        let output = run(&SwitchProcessor, &node("路由", "SWITCH", config), &exec)
            .await
            .unwrap();
        assert_eq!(output.branch.as_deref(), Some("money"));

        let exec = upstream(context_with_input(json!({})), "分类", json!({"result": "other"}));
        let config = json!({"expression": "nodes['分类'].result", "cases": []});
        let output = run(&SwitchProcessor, &node("路由", "SWITCH", config), &exec)
            .await
            .unwrap();
        assert_eq!(output.branch.as_deref(), Some("default"));
    }

    #[tokio::test]
    async fn bad_expression_is_fatal() {
        let node = node("c", "CONDITION", json!({"expression": "(("}));
        let err = run(&ConditionProcessor, &node, &context_with_input(json!({})))
            .await
            .unwrap_err();
        assert!(!err.is_retryable());
    }
}
