//! Result aggregation.
//!
//! `ResultAggregator` accumulates per-node results, skips, token usage and
//! output files as a run progresses, then produces the terminal
//! [`WorkflowExecutionResult`] exactly once.

use chrono::{DateTime, Utc};
use nodeflow_types::result::{
    NodeFailure, NodeResult, SkippedNode, TokenUsage, WorkflowExecutionResult, WorkflowStatus,
};
use nodeflow_types::storage::OutputFile;
use nodeflow_types::workflow::ExecutionMode;
use serde_json::{Map, Value};
use tokio::time::Instant;
use uuid::Uuid;

use super::graph::WorkflowGraph;

#[derive(Debug)]
pub struct ResultAggregator {
    run_id: Uuid,
    mode: ExecutionMode,
    started_at: DateTime<Utc>,
    started: Instant,
    node_results: Vec<NodeResult>,
    skipped: Vec<SkippedNode>,
    output_files: Vec<OutputFile>,
    token_usage: TokenUsage,
}

impl ResultAggregator {
    pub fn new(run_id: Uuid, mode: ExecutionMode) -> Self {
        Self {
            run_id,
            mode,
            started_at: Utc::now(),
            started: Instant::now(),
            node_results: Vec::new(),
            skipped: Vec::new(),
            output_files: Vec::new(),
            token_usage: TokenUsage::default(),
        }
    }

    /// Record a finished node, successful or not.
    pub fn record(&mut self, result: NodeResult, files: Vec<OutputFile>) {
        if let Some(usage) = &result.token_usage {
            self.token_usage.accumulate(usage);
        }
        self.output_files.extend(files);
        self.node_results.push(result);
    }

    pub fn skip(&mut self, skipped: SkippedNode) {
        self.skipped.push(skipped);
    }

    /// Failures recorded so far, in completion order.
    pub fn failures(&self) -> Vec<NodeFailure> {
        self.node_results
            .iter()
            .filter(|r| !r.is_success())
            .map(|r| NodeFailure {
                node_id: r.node_id.clone(),
                node_name: r.node_name.clone(),
                error: r.error.clone().unwrap_or_default(),
            })
            .collect()
    }

    /// Seal the run.
    ///
    /// `unreached` lists nodes the run never got to; `error` is the run-level
    /// summary chosen by the orchestrator.
    pub fn finish(
        self,
        graph: &WorkflowGraph,
        status: WorkflowStatus,
        error: Option<String>,
        unreached: Vec<String>,
    ) -> WorkflowExecutionResult {
        let output = select_output(graph, &self.node_results);
        let errors = self.failures();
        WorkflowExecutionResult {
            run_id: self.run_id,
            status,
            mode: self.mode,
            output,
            skipped_nodes: self.skipped,
            unreached_nodes: unreached,
            error,
            errors,
            total_duration_ms: self.started.elapsed().as_millis() as u64,
            total_tokens: self.token_usage.total_tokens,
            token_usage: self.token_usage,
            output_files: self.output_files,
            started_at: self.started_at,
            completed_at: Utc::now(),
            node_results: self.node_results,
        }
    }
}

/// Output of the successful terminal node(s).
///
/// One terminal yields its `result` (or whole data map); several yield an
/// object keyed by node name.
fn select_output(graph: &WorkflowGraph, results: &[NodeResult]) -> Value {
    let terminals: Vec<&NodeResult> = graph
        .terminal_nodes()
        .into_iter()
        .filter_map(|node| {
            results
                .iter()
                .find(|r| r.node_id == node.id && r.is_success())
        })
        .collect();

    let primary = |r: &NodeResult| {
        r.data
            .get("result")
            .cloned()
            .unwrap_or_else(|| Value::Object(r.data.clone()))
    };

    match terminals.as_slice() {
        [] => Value::Null,
        [only] => primary(only),
        many => Value::Object(
            many.iter()
                .map(|r| (r.node_name.clone(), primary(r)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

/// Whether at least one terminal node of `graph` ran to success.
pub fn any_terminal_succeeded(graph: &WorkflowGraph, aggregator: &ResultAggregator) -> bool {
    graph.terminal_nodes().iter().any(|node| {
        aggregator
            .node_results
            .iter()
            .any(|r| r.node_id == node.id && r.is_success())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::context::tests::success;
    use nodeflow_types::result::{NodeStatus, SkipReason};
    use nodeflow_types::workflow::WorkflowDefinition;
    use serde_json::json;

    fn graph() -> WorkflowGraph {
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "nodes": [
                {"id": "a", "name": "A", "type": "INPUT"},
                {"id": "b", "name": "B", "type": "PROCESS", "config": {"userPrompt": "x"}},
                {"id": "c", "name": "C", "type": "PROCESS", "config": {"userPrompt": "y"}},
                {"id": "out", "name": "Out", "type": "OUTPUT", "config": {"content": "{{B}}"}}
            ],
            "edges": [
                {"id": "1", "source": "a", "target": "b"},
                {"id": "2", "source": "a", "target": "c"},
                {"id": "3", "source": "b", "target": "out"}
            ]
        }))
        .unwrap();
        WorkflowGraph::build(&def).unwrap()
    }

    fn result(id: &str, name: &str, data: Value, usage: Option<TokenUsage>) -> NodeResult {
        let mut r = success(name, data);
        r.node_id = id.into();
        r.token_usage = usage;
        r
    }

    #[test]
    fn sums_tokens_and_picks_output() {
        let mut agg = ResultAggregator::new(Uuid::now_v7(), ExecutionMode::Sync);
        agg.record(result("a", "A", json!({}), None), vec![]);
        agg.record(result("b", "B", json!({"result": "x"}), Some(TokenUsage::new(10, 5))), vec![]);
        agg.record(result("c", "C", json!({"result": "y"}), Some(TokenUsage::new(20, 0))), vec![]);
        agg.record(result("out", "Out", json!({"result": "final"}), None), vec![]);

        let graph = graph();
        assert!(any_terminal_succeeded(&graph, &agg));
        let res = agg.finish(&graph, WorkflowStatus::Completed, None, vec![]);
        assert_eq!(res.total_tokens, 35);
        assert_eq!(res.token_usage.prompt_tokens, 30);
        assert_eq!(res.output, json!("final"));
        assert!(res.errors.is_empty());
    }

    #[test]
    fn failures_are_listed() {
        let mut agg = ResultAggregator::new(Uuid::now_v7(), ExecutionMode::Async);
        let mut failed = result("c", "C", json!({}), None);
        failed.status = NodeStatus::Error;
        failed.error = Some("boom".into());
        agg.record(failed, vec![]);
        agg.skip(SkippedNode {
            node_id: "out".into(),
            node_name: "Out".into(),
            reason: SkipReason::UpstreamFailed {
                dependency: "C".into(),
            },
        });

        let graph = graph();
        assert!(!any_terminal_succeeded(&graph, &agg));
        let res = agg.finish(&graph, WorkflowStatus::Failed, Some("boom".into()), vec!["b".into()]);
        assert_eq!(res.errors[0].error, "boom");
        assert_eq!(res.output, Value::Null);
        assert!(res.is_skipped("out"));
        assert_eq!(res.unreached_nodes, vec!["b".to_string()]);
        assert_eq!(res.mode, ExecutionMode::Async);
    }

    #[test]
    fn one_successful_terminal_is_enough() {
        // `c` failed but the OUTPUT terminal ran.
        let mut agg = ResultAggregator::new(Uuid::now_v7(), ExecutionMode::Sync);
        let mut failed = result("c", "C", json!({}), None);
        failed.status = NodeStatus::Error;
        failed.error = Some("boom".into());
        agg.record(failed, vec![]);
        agg.record(result("out", "Out", json!({"result": "final"}), None), vec![]);

        assert!(any_terminal_succeeded(&graph(), &agg));
    }
}
