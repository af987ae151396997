//! Execution result types.
//!
//! A [`NodeResult`] is written once per executed node and never mutated; a
//! [`WorkflowExecutionResult`] is assembled once at the end of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::node::NodeType;
use crate::storage::OutputFile;
use crate::workflow::ExecutionMode;

// ---------------------------------------------------------------------------
// Node Results
// ---------------------------------------------------------------------------

/// Terminal status of one node execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Success,
    Error,
}

/// Token counts reported by an AI completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }

    /// Add another usage into this one.
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// The immutable record of one node's execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeResult {
    pub node_id: String,
    pub node_name: String,
    pub node_type: NodeType,
    pub status: NodeStatus,
    /// Processor output. The primary value lives under `result`.
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<TokenUsage>,
    /// Number of processor invocations, retries included.
    pub attempts: u32,
    /// Template tokens that could not be resolved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl NodeResult {
    pub fn is_success(&self) -> bool {
        self.status == NodeStatus::Success
    }
}

/// Why a node was never invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SkipReason {
    /// A predecessor failed or was itself skipped because of a failure.
    UpstreamFailed { dependency: String },
    /// Every incoming edge belongs to a branch that was not selected.
    BranchNotTaken,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedNode {
    pub node_id: String,
    pub node_name: String,
    pub reason: SkipReason,
}

/// A node that ended in error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeFailure {
    pub node_id: String,
    pub node_name: String,
    pub error: String,
}

// ---------------------------------------------------------------------------
// Workflow Results
// ---------------------------------------------------------------------------

/// Lifecycle of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "timeout" => Ok(Self::Timeout),
            other => Err(format!("unknown workflow status: {other}")),
        }
    }
}

/// Terminal aggregate of one run.
///
/// Carries enough detail to tell, per node, whether it succeeded, failed,
/// was skipped (and why), or was never reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowExecutionResult {
    pub run_id: Uuid,
    pub status: WorkflowStatus,
    #[serde(default)]
    pub mode: ExecutionMode,
    /// Output of the terminal OUTPUT node(s).
    pub output: Value,
    pub node_results: Vec<NodeResult>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped_nodes: Vec<SkippedNode>,
    /// Ids of nodes never scheduled because the run stopped first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unreached_nodes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<NodeFailure>,
    pub total_duration_ms: u64,
    pub total_tokens: u64,
    pub token_usage: TokenUsage,
    #[serde(default)]
    pub output_files: Vec<OutputFile>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl WorkflowExecutionResult {
    /// Result of the node named `name`, if it executed.
    pub fn node(&self, name: &str) -> Option<&NodeResult> {
        self.node_results.iter().find(|r| r.node_name == name)
    }

    pub fn is_skipped(&self, node_id: &str) -> bool {
        self.skipped_nodes.iter().any(|s| s.node_id == node_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_usage_accumulates() {
        let mut total = TokenUsage::default();
        total.accumulate(&TokenUsage::new(10, 5));
        total.accumulate(&TokenUsage::new(20, 0));
        assert_eq!(total.prompt_tokens, 30);
        assert_eq!(total.completion_tokens, 5);
        assert_eq!(total.total_tokens, 35);
    }

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(
            serde_json::to_value(WorkflowStatus::Timeout).unwrap(),
            "timeout"
        );
        assert_eq!(serde_json::to_value(NodeStatus::Error).unwrap(), "error");
        assert_eq!(
            "cancelled".parse::<WorkflowStatus>().unwrap(),
            WorkflowStatus::Cancelled
        );
        assert!(WorkflowStatus::Failed.is_terminal());
        assert!(!WorkflowStatus::Running.is_terminal());
    }

    #[test]
    fn skip_reason_is_tagged() {
        let reason = SkipReason::UpstreamFailed {
            dependency: "fetch".into(),
        };
        let value = serde_json::to_value(&reason).unwrap();
        assert_eq!(value["kind"], "upstream_failed");
        assert_eq!(value["dependency"], "fetch");
        let branch = serde_json::to_value(SkipReason::BranchNotTaken).unwrap();
        assert_eq!(branch["kind"], "branch_not_taken");
    }
}
