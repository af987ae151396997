//! Workflow definition types.
//!
//! A [`WorkflowDefinition`] is the immutable input of one run: typed nodes,
//! the edges between them, execution settings, and global variables. It is
//! loaded from JSON or YAML (or from the persistence layer) and never
//! mutated while a run is in flight.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::node::NodeDefinition;

// ---------------------------------------------------------------------------
// Workflow Definition
// ---------------------------------------------------------------------------

/// A declarative graph of typed processing nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    /// Definition format version.
    #[serde(default = "default_version")]
    pub version: u32,
    /// Optional human-readable workflow name (used in logs only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Optional longer description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Nodes of the graph.
    pub nodes: Vec<NodeDefinition>,
    /// Directed dependency edges between nodes.
    #[serde(default)]
    pub edges: Vec<EdgeDefinition>,
    /// Execution settings for runs of this definition.
    #[serde(default)]
    pub settings: ExecutionSettings,
    /// Variables readable from templates by key.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub global_variables: Map<String, Value>,
}

fn default_version() -> u32 {
    1
}

impl WorkflowDefinition {
    /// Display name for logs: the configured name or `"unnamed"`.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }
}

/// A directed edge `source -> target`.
///
/// Handles identify ports on multi-port nodes. For CONDITION and SWITCH
/// nodes, `source_handle` names the branch that activates this edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDefinition {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

// ---------------------------------------------------------------------------
// Execution Settings
// ---------------------------------------------------------------------------

/// How a failing node affects the rest of the run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParallelErrorStrategy {
    /// First node error aborts the level and fails the run.
    #[default]
    FailFast,
    /// Skip dependents of failed nodes, keep running independent branches.
    Continue,
    /// Like `Continue`, and report every collected node error together.
    Collect,
}

impl ParallelErrorStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FailFast => "fail_fast",
            Self::Continue => "continue",
            Self::Collect => "collect",
        }
    }
}

impl std::str::FromStr for ParallelErrorStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail_fast" | "fail-fast" => Ok(Self::FailFast),
            "continue" => Ok(Self::Continue),
            "collect" => Ok(Self::Collect),
            other => Err(format!(
                "unknown error strategy '{other}' (expected fail_fast, continue or collect)"
            )),
        }
    }
}

/// Per-definition execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSettings {
    /// Run the nodes of one level concurrently.
    #[serde(default = "default_true")]
    pub enable_parallel_execution: bool,
    #[serde(default)]
    pub parallel_error_strategy: ParallelErrorStrategy,
    /// Total invocation budget per node for retryable failures (default 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Run-wide deadline in seconds (default 1800).
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    /// Per-node timeout in seconds (default 300).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_timeout_seconds: Option<u64>,
    /// Base delay of the exponential retry backoff (default 1000ms).
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_max_retries() -> u32 {
    3
}

fn default_timeout_seconds() -> u64 {
    DEFAULT_WORKFLOW_TIMEOUT_SECS
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

/// Default run-wide timeout (30 minutes).
pub const DEFAULT_WORKFLOW_TIMEOUT_SECS: u64 = 1800;

/// Default per-node timeout (5 minutes).
pub const DEFAULT_NODE_TIMEOUT_SECS: u64 = 300;

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            enable_parallel_execution: true,
            parallel_error_strategy: ParallelErrorStrategy::default(),
            max_retries: default_max_retries(),
            timeout_seconds: DEFAULT_WORKFLOW_TIMEOUT_SECS,
            node_timeout_seconds: None,
            retry_base_delay_ms: default_retry_base_delay_ms(),
        }
    }
}

impl ExecutionSettings {
    /// Settings for one run: these settings with per-run overrides applied.
    pub fn with_options(&self, options: &ExecutionOptions) -> ExecutionSettings {
        let mut effective = self.clone();
        if let Some(timeout) = options.timeout_seconds {
            effective.timeout_seconds = timeout;
        }
        if let Some(max_retries) = options.max_retries {
            effective.max_retries = max_retries;
        }
        if let Some(strategy) = options.parallel_error_strategy {
            effective.parallel_error_strategy = strategy;
        }
        if let Some(parallel) = options.enable_parallel_execution {
            effective.enable_parallel_execution = parallel;
        }
        effective
    }
}

// ---------------------------------------------------------------------------
// Execution Options
// ---------------------------------------------------------------------------

/// How the caller intends to consume the run.
///
/// The engine always executes a run to completion; `Async` only records
/// that the caller handed the call to a queue.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    #[default]
    Sync,
    Async,
}

/// Per-run overrides of [`ExecutionSettings`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOptions {
    #[serde(default)]
    pub mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_error_strategy: Option<ParallelErrorStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enable_parallel_execution: Option<bool>,
}
