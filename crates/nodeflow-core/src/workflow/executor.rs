//! Workflow engine: level-by-level DAG execution.
//!
//! The `WorkflowEngine` validates a definition into a [`WorkflowGraph`], then
//! walks its execution levels in order. Nodes of one level run concurrently
//! in a `tokio::task::JoinSet` (or one at a time when parallel execution is
//! disabled). Between levels the orchestrator appends the level's results to
//! the [`ExecutionContext`], which is the only write to shared run state.
//!
//! # Execution flow
//!
//! 1. Build and validate the graph; resolve effective settings.
//! 2. For each level: check cancellation and the run deadline, decide which
//!    nodes are skipped (failed dependency or branch not taken), then launch
//!    the rest.
//! 3. Each node runs through its processor with a per-node timeout, retry
//!    with backoff, panic capture and cancellation.
//! 4. The error strategy decides whether a failure stops the run.
//! 5. The aggregator seals the result; persistence and events are side
//!    channels.

use std::collections::{HashMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use futures_util::FutureExt;
use nodeflow_types::config::EngineSection;
use nodeflow_types::event::EngineEvent;
use nodeflow_types::knowledge::KnowledgeConfig;
use nodeflow_types::llm::AiConfig;
use nodeflow_types::node::NodeDefinition;
use nodeflow_types::result::{
    NodeResult, NodeStatus, SkipReason, SkippedNode, WorkflowExecutionResult, WorkflowStatus,
};
use nodeflow_types::storage::OutputFile;
use nodeflow_types::workflow::{
    DEFAULT_NODE_TIMEOUT_SECS, ExecutionMode, ExecutionOptions, ExecutionSettings,
    ParallelErrorStrategy, WorkflowDefinition,
};
use serde_json::{Map, Value};
use tokio::task::{self, JoinSet};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::event::bus::EventBus;
use crate::repository::execution::ExecutionRepository;

use super::aggregator::{ResultAggregator, any_terminal_succeeded};
use super::context::ExecutionContext;
use super::error::{EngineError, ProcessorError};
use super::graph::WorkflowGraph;
use super::registry::{NodeContext, NodeOutput, ProcessorRegistry, ProcessorServices};
use super::retry::RetryPolicy;

/// Upper bound for a run deadline, so huge timeouts cannot overflow `Instant`.
const MAX_RUN_SECS: u64 = 365 * 24 * 60 * 60;

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Engine-wide limits that definitions do not control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineLimits {
    /// Node timeout for definitions without `nodeTimeoutSeconds`.
    pub node_timeout: Duration,
    /// Ceiling for one retry backoff delay.
    pub max_backoff: Duration,
    /// Bound on one repository write; a stalled store never holds a run.
    pub repository_timeout: Duration,
}

impl EngineLimits {
    pub fn from_section(section: &EngineSection) -> Self {
        Self {
            node_timeout: Duration::from_secs(section.node_timeout_secs),
            max_backoff: Duration::from_secs(section.max_backoff_secs),
            repository_timeout: Duration::from_secs(section.repository_timeout_secs),
        }
    }
}

impl Default for EngineLimits {
    fn default() -> Self {
        Self {
            node_timeout: Duration::from_secs(DEFAULT_NODE_TIMEOUT_SECS),
            max_backoff: Duration::from_secs(60),
            repository_timeout: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// WorkflowEngine
// ---------------------------------------------------------------------------

/// Explicitly constructed engine service.
///
/// Generic over `R: ExecutionRepository` for storage flexibility. Owns the
/// processor registry, the collaborators, the event bus, and the
/// cancellation tokens of in-flight runs.
pub struct WorkflowEngine<R: ExecutionRepository> {
    registry: Arc<ProcessorRegistry>,
    services: Arc<ProcessorServices>,
    repo: Arc<R>,
    event_bus: EventBus,
    ai_config: Arc<AiConfig>,
    knowledge_config: Arc<KnowledgeConfig>,
    limits: EngineLimits,
    /// Cancellation tokens keyed by run_id.
    runs: DashMap<Uuid, CancellationToken>,
    /// Parent of every run token; cancelled on shutdown.
    shutdown: CancellationToken,
}

/// Why a run stopped scheduling before its last level.
#[derive(Debug, Clone, PartialEq)]
enum Stop {
    Failed(String),
    Cancelled,
    Timeout,
}

/// What one node execution produced.
#[derive(Debug)]
struct NodeRun {
    result: NodeResult,
    files: Vec<OutputFile>,
    branch: Option<String>,
    /// The run deadline ended the node's last attempt or its retries.
    cut_off: bool,
}

/// Mutable state of one run, owned by the orchestrator.
struct RunState {
    exec: ExecutionContext,
    aggregator: ResultAggregator,
    /// Nodes that failed or were skipped because of a failure.
    failed: HashSet<String>,
    branch_skipped: HashSet<String>,
    /// Selected handle per branching node.
    branches: HashMap<String, String>,
    unreached: Vec<String>,
    /// Some node lost work to the run deadline.
    cut_off: bool,
}

/// Per-run parameters shared by every level.
struct RunPlan {
    graph: Arc<WorkflowGraph>,
    policy: RetryPolicy,
    node_timeout: Duration,
    parallel: bool,
    strategy: ParallelErrorStrategy,
    token: CancellationToken,
}

/// Removes a run's token from the registry however the run ends.
struct RunGuard<'a> {
    runs: &'a DashMap<Uuid, CancellationToken>,
    run_id: Uuid,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.runs.remove(&self.run_id);
    }
}

impl<R: ExecutionRepository> WorkflowEngine<R> {
    pub fn new(repo: R, registry: ProcessorRegistry, services: ProcessorServices) -> Self {
        Self {
            registry: Arc::new(registry),
            services: Arc::new(services),
            repo: Arc::new(repo),
            event_bus: EventBus::default(),
            ai_config: Arc::new(AiConfig::default()),
            knowledge_config: Arc::new(KnowledgeConfig::default()),
            limits: EngineLimits::default(),
            runs: DashMap::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// AI defaults snapshotted into every run.
    pub fn with_ai_config(mut self, config: AiConfig) -> Self {
        self.ai_config = Arc::new(config);
        self
    }

    /// Knowledge defaults snapshotted into every run.
    pub fn with_knowledge_config(mut self, config: KnowledgeConfig) -> Self {
        self.knowledge_config = Arc::new(config);
        self
    }

    pub fn with_limits(mut self, limits: EngineLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    /// Ids of runs currently executing.
    pub fn active_runs(&self) -> Vec<Uuid> {
        self.runs.iter().map(|entry| *entry.key()).collect()
    }

    /// Signal one run to stop. Returns false if no such run is executing.
    pub fn cancel(&self, run_id: Uuid) -> bool {
        match self.runs.get(&run_id) {
            Some(token) => {
                token.cancel();
                tracing::info!(run_id = %run_id, "workflow cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Cancel every in-flight run and refuse new ones.
    pub fn shutdown(&self) {
        tracing::info!(active = self.runs.len(), "workflow engine shutting down");
        self.shutdown.cancel();
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Load a stored definition and execute it.
    pub async fn execute_by_id(
        &self,
        definition_id: &str,
        input: Map<String, Value>,
        options: ExecutionOptions,
    ) -> Result<WorkflowExecutionResult, EngineError> {
        let definition = self.repo.load_definition(definition_id).await?;
        self.execute_workflow(&definition, input, options).await
    }

    /// Execute `definition` to a terminal result.
    ///
    /// Only problems that prevent the run from starting (validation,
    /// shutdown) are errors; node failures are reported in the result.
    pub async fn execute_workflow(
        &self,
        definition: &WorkflowDefinition,
        input: Map<String, Value>,
        options: ExecutionOptions,
    ) -> Result<WorkflowExecutionResult, EngineError> {
        self.execute_with_run_id(Uuid::now_v7(), definition, input, options)
            .await
    }

    /// Execute under a caller-chosen run id, so the caller can cancel the
    /// run while it is in flight.
    #[tracing::instrument(
        skip_all,
        fields(run_id = %run_id, workflow = %definition.display_name())
    )]
    pub async fn execute_with_run_id(
        &self,
        run_id: Uuid,
        definition: &WorkflowDefinition,
        input: Map<String, Value>,
        options: ExecutionOptions,
    ) -> Result<WorkflowExecutionResult, EngineError> {
        if self.shutdown.is_cancelled() {
            return Err(EngineError::ShuttingDown);
        }
        let graph = Arc::new(WorkflowGraph::build(definition)?);
        let settings = definition.settings.with_options(&options);

        let token = self.shutdown.child_token();
        self.runs.insert(run_id, token.clone());
        let _guard = RunGuard {
            runs: &self.runs,
            run_id,
        };

        tracing::info!(
            nodes = graph.node_count(),
            levels = graph.level_count(),
            parallel = settings.enable_parallel_execution,
            strategy = settings.parallel_error_strategy.as_str(),
            "workflow run started"
        );
        self.event_bus.publish(EngineEvent::RunStarted {
            run_id,
            workflow_name: definition.display_name().to_string(),
            node_count: graph.node_count(),
            level_count: graph.level_count(),
        });

        let result = self
            .drive(run_id, definition, graph, input, &settings, options.mode, token)
            .await;

        tracing::info!(
            status = result.status.as_str(),
            duration_ms = result.total_duration_ms,
            total_tokens = result.total_tokens,
            failed = result.errors.len(),
            skipped = result.skipped_nodes.len(),
            "workflow run finished"
        );
        self.event_bus.publish(EngineEvent::RunFinished {
            run_id,
            status: result.status,
            duration_ms: result.total_duration_ms,
        });
        let persist = self.repo.persist_execution_result(&result);
        match tokio::time::timeout(self.limits.repository_timeout, persist).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(run_id = %run_id, error = %e, "failed to persist execution result");
            }
            Err(_) => {
                tracing::warn!(
                    run_id = %run_id,
                    timeout_ms = self.limits.repository_timeout.as_millis() as u64,
                    "persisting execution result timed out"
                );
            }
        }
        Ok(result)
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive(
        &self,
        run_id: Uuid,
        definition: &WorkflowDefinition,
        graph: Arc<WorkflowGraph>,
        input: Map<String, Value>,
        settings: &ExecutionSettings,
        mode: ExecutionMode,
        token: CancellationToken,
    ) -> WorkflowExecutionResult {
        let deadline = deadline_after(settings.timeout_seconds);
        let exec = ExecutionContext::new(run_id, definition, input, deadline)
            .with_ai_config(Arc::clone(&self.ai_config))
            .with_knowledge_config(Arc::clone(&self.knowledge_config))
            .with_cancellation(token.clone());

        let plan = RunPlan {
            graph: Arc::clone(&graph),
            policy: RetryPolicy::from_settings(settings, self.limits.max_backoff),
            node_timeout: settings
                .node_timeout_seconds
                .map_or(self.limits.node_timeout, Duration::from_secs),
            parallel: settings.enable_parallel_execution,
            strategy: settings.parallel_error_strategy,
            token,
        };
        let mut state = RunState {
            exec,
            aggregator: ResultAggregator::new(run_id, mode),
            failed: HashSet::new(),
            branch_skipped: HashSet::new(),
            branches: HashMap::new(),
            unreached: Vec::new(),
            cut_off: false,
        };

        let mut stop: Option<Stop> = None;
        for (level_idx, level) in graph.levels().enumerate() {
            if stop.is_none() {
                stop = interruption(&plan.token, &state.exec);
            }
            if stop.is_some() {
                state.unreached.extend(level.iter().map(|n| n.id.clone()));
                continue;
            }

            let mut runnable = Vec::with_capacity(level.len());
            for node in level {
                match skip_reason(&graph, node, &state) {
                    Some(reason) => self.skip(&mut state, node, reason),
                    None => runnable.push(node.clone()),
                }
            }

            tracing::debug!(
                level = level_idx,
                nodes = runnable.len(),
                "processing level"
            );
            stop = if plan.parallel {
                self.run_parallel(&mut state, &plan, runnable).await
            } else {
                self.run_sequential(&mut state, &plan, runnable).await
            };
        }

        if stop.is_none() && state.cut_off {
            stop = Some(Stop::Timeout);
        }
        let (status, error) = match stop {
            Some(Stop::Cancelled) => (WorkflowStatus::Cancelled, Some("run cancelled".to_string())),
            Some(Stop::Timeout) => (
                WorkflowStatus::Timeout,
                Some(format!(
                    "run exceeded its {}s timeout",
                    settings.timeout_seconds
                )),
            ),
            Some(Stop::Failed(message)) => (WorkflowStatus::Failed, Some(message)),
            None => {
                let failures = state.aggregator.failures();
                let status = if failures.is_empty() || any_terminal_succeeded(&graph, &state.aggregator)
                {
                    WorkflowStatus::Completed
                } else {
                    WorkflowStatus::Failed
                };
                let error = match plan.strategy {
                    ParallelErrorStrategy::Collect if !failures.is_empty() => Some(
                        failures
                            .iter()
                            .map(|f| format!("node '{}' failed: {}", f.node_name, f.error))
                            .collect::<Vec<_>>()
                            .join("; "),
                    ),
                    _ => failures
                        .first()
                        .map(|f| format!("node '{}' failed: {}", f.node_name, f.error)),
                };
                (status, error)
            }
        };

        let unreached = std::mem::take(&mut state.unreached);
        state.aggregator.finish(&graph, status, error, unreached)
    }

    /// Launch every node of a level at once and join them.
    async fn run_parallel(
        &self,
        state: &mut RunState,
        plan: &RunPlan,
        nodes: Vec<NodeDefinition>,
    ) -> Option<Stop> {
        let mut join_set = JoinSet::new();
        let mut pending = Vec::with_capacity(nodes.len());
        for node in nodes {
            let handle = join_set.spawn(self.job(state, plan, node.clone()).run());
            pending.push((handle.id(), node));
        }
        self.drain(state, plan, &mut join_set, pending).await
    }

    /// Run a level's nodes one at a time in definition order.
    async fn run_sequential(
        &self,
        state: &mut RunState,
        plan: &RunPlan,
        nodes: Vec<NodeDefinition>,
    ) -> Option<Stop> {
        for (idx, node) in nodes.iter().enumerate() {
            if let Some(stop) = interruption(&plan.token, &state.exec) {
                state.unreached.extend(nodes[idx..].iter().map(|n| n.id.clone()));
                return Some(stop);
            }
            let mut join_set = JoinSet::new();
            let handle = join_set.spawn(self.job(state, plan, node.clone()).run());
            let pending = vec![(handle.id(), node.clone())];
            if let Some(stop) = self.drain(state, plan, &mut join_set, pending).await {
                state
                    .unreached
                    .extend(nodes[idx + 1..].iter().map(|n| n.id.clone()));
                return Some(stop);
            }
        }
        None
    }

    /// Join spawned nodes, absorbing results as they complete.
    ///
    /// Stops early on cancellation, on the run deadline, or on the first
    /// failure under fail-fast; outstanding tasks are aborted and reported
    /// as unreached.
    async fn drain(
        &self,
        state: &mut RunState,
        plan: &RunPlan,
        join_set: &mut JoinSet<NodeRun>,
        mut pending: Vec<(task::Id, NodeDefinition)>,
    ) -> Option<Stop> {
        let deadline = state.exec.deadline();
        loop {
            let joined = tokio::select! {
                biased;
                _ = plan.token.cancelled() => Err(Stop::Cancelled),
                next = tokio::time::timeout_at(deadline, join_set.join_next_with_id()) => {
                    next.map_err(|_| Stop::Timeout)
                }
            };

            let run = match joined {
                Err(stop) => {
                    join_set.abort_all();
                    tracing::warn!(
                        outstanding = pending.len(),
                        reason = ?stop,
                        "aborting in-flight nodes"
                    );
                    state
                        .unreached
                        .extend(pending.drain(..).map(|(_, node)| node.id));
                    return Some(stop);
                }
                Ok(None) => return None,
                Ok(Some(Ok((id, run)))) => {
                    pending.retain(|(pending_id, _)| *pending_id != id);
                    run
                }
                Ok(Some(Err(join_error))) => {
                    let Some(pos) = pending.iter().position(|(id, _)| *id == join_error.id()) else {
                        continue;
                    };
                    let (_, node) = pending.remove(pos);
                    if join_error.is_cancelled() {
                        state.unreached.push(node.id);
                        continue;
                    }
                    let now = Utc::now();
                    NodeRun {
                        result: error_result(&node, format!("node task failed: {join_error}"), now, 0, 1),
                        files: Vec::new(),
                        branch: None,
                        cut_off: false,
                    }
                }
            };

            let failure = self.absorb(state, run).await;
            if let Some(message) = failure.filter(|_| plan.strategy == ParallelErrorStrategy::FailFast) {
                join_set.abort_all();
                state
                    .unreached
                    .extend(pending.drain(..).map(|(_, node)| node.id));
                if state.cut_off {
                    return Some(Stop::Timeout);
                }
                return Some(Stop::Failed(message));
            }
        }
    }

    fn job(&self, state: &RunState, plan: &RunPlan, node: NodeDefinition) -> NodeJob {
        NodeJob {
            node,
            graph: Arc::clone(&plan.graph),
            exec: state.exec.clone(),
            registry: Arc::clone(&self.registry),
            services: Arc::clone(&self.services),
            events: self.event_bus.clone(),
            policy: plan.policy,
            node_timeout: plan.node_timeout,
        }
    }

    /// Fold a finished node into the run. Returns the failure summary if the
    /// node failed.
    async fn absorb(&self, state: &mut RunState, run: NodeRun) -> Option<String> {
        let NodeRun {
            result,
            files,
            branch,
            cut_off,
        } = run;
        let run_id = state.exec.run_id();
        state.cut_off |= cut_off;

        // Never past the run deadline, so a stalled store cannot stretch the run.
        let limit = self
            .limits
            .repository_timeout
            .min(state.exec.deadline().saturating_duration_since(Instant::now()));
        match tokio::time::timeout(limit, self.repo.append_execution_log(&run_id, &result)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(run_id = %run_id, node = %result.node_name, error = %e, "failed to append execution log");
            }
            Err(_) => {
                tracing::warn!(
                    run_id = %run_id,
                    node = %result.node_name,
                    timeout_ms = limit.as_millis() as u64,
                    "appending execution log timed out"
                );
            }
        }

        let failure = if result.is_success() {
            if let Some(handle) = branch {
                state.branches.insert(result.node_id.clone(), handle);
            }
            if let Err(e) = state.exec.record_output(Arc::new(result.clone())) {
                tracing::warn!(error = %e, "ignoring duplicate node output");
            }
            None
        } else {
            state.failed.insert(result.node_id.clone());
            Some(format!(
                "node '{}' failed: {}",
                result.node_name,
                result.error.as_deref().unwrap_or("unknown error")
            ))
        };

        state.aggregator.record(result, files);
        failure
    }

    fn skip(&self, state: &mut RunState, node: &NodeDefinition, reason: SkipReason) {
        match &reason {
            SkipReason::UpstreamFailed { dependency } => {
                tracing::info!(node = %node.name, dependency = %dependency, "skipping node: upstream failed");
                state.failed.insert(node.id.clone());
            }
            SkipReason::BranchNotTaken => {
                tracing::debug!(node = %node.name, "skipping node: branch not taken");
                state.branch_skipped.insert(node.id.clone());
            }
        }
        self.event_bus.publish(EngineEvent::NodeSkipped {
            run_id: state.exec.run_id(),
            node_id: node.id.clone(),
            reason: reason.clone(),
        });
        state.aggregator.skip(SkippedNode {
            node_id: node.id.clone(),
            node_name: node.name.clone(),
            reason,
        });
    }
}

impl<R: ExecutionRepository> std::fmt::Debug for WorkflowEngine<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowEngine")
            .field("registry", &self.registry)
            .field("services", &self.services)
            .field("limits", &self.limits)
            .field("active_runs", &self.runs.len())
            .finish()
    }
}

fn deadline_after(timeout_secs: u64) -> Instant {
    Instant::now() + Duration::from_secs(timeout_secs.min(MAX_RUN_SECS))
}

/// Cancellation wins over the deadline when both apply.
fn interruption(token: &CancellationToken, exec: &ExecutionContext) -> Option<Stop> {
    if token.is_cancelled() {
        Some(Stop::Cancelled)
    } else if exec.is_past_deadline() {
        Some(Stop::Timeout)
    } else {
        None
    }
}

/// Decide whether `node` must be skipped.
///
/// Any failed (or failure-skipped) predecessor skips the node. Otherwise the
/// node is skipped when every incoming edge is inactive: its source was
/// skipped by branching, or its `sourceHandle` names a branch the source did
/// not select.
fn skip_reason(graph: &WorkflowGraph, node: &NodeDefinition, state: &RunState) -> Option<SkipReason> {
    let incoming = graph.incoming_edges(&node.id);
    if incoming.is_empty() {
        return None;
    }

    if let Some(edge) = incoming.iter().find(|e| state.failed.contains(&e.source)) {
        let dependency = graph
            .node(&edge.source)
            .map_or_else(|| edge.source.clone(), |n| n.name.clone());
        return Some(SkipReason::UpstreamFailed { dependency });
    }

    let inactive = |edge: &&nodeflow_types::workflow::EdgeDefinition| {
        if state.branch_skipped.contains(&edge.source) {
            return true;
        }
        match (edge.source_handle.as_deref(), state.branches.get(&edge.source)) {
            (Some(handle), Some(selected)) => handle != selected,
            _ => false,
        }
    };
    if incoming.iter().all(inactive) {
        return Some(SkipReason::BranchNotTaken);
    }
    None
}

fn error_result(
    node: &NodeDefinition,
    error: String,
    started_at: chrono::DateTime<Utc>,
    duration_ms: u64,
    attempts: u32,
) -> NodeResult {
    NodeResult {
        node_id: node.id.clone(),
        node_name: node.name.clone(),
        node_type: node.node_type(),
        status: NodeStatus::Error,
        data: Map::new(),
        error: Some(error),
        started_at,
        completed_at: Utc::now(),
        duration_ms,
        token_usage: None,
        attempts,
        warnings: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// NodeJob
// ---------------------------------------------------------------------------

/// Everything a spawned node task owns.
struct NodeJob {
    node: NodeDefinition,
    graph: Arc<WorkflowGraph>,
    exec: ExecutionContext,
    registry: Arc<ProcessorRegistry>,
    services: Arc<ProcessorServices>,
    events: EventBus,
    policy: RetryPolicy,
    node_timeout: Duration,
}

impl NodeJob {
    async fn run(self) -> NodeRun {
        let span = tracing::info_span!(
            "node",
            run_id = %self.exec.run_id(),
            node = %self.node.name,
            node_type = self.node.node_type().as_str(),
        );
        self.execute().instrument(span).await
    }

    async fn execute(self) -> NodeRun {
        let run_id = self.exec.run_id();
        let started_at = Utc::now();
        let start = Instant::now();

        let Some(processor) = self.registry.get(self.node.node_type()) else {
            let message = format!("no processor registered for {}", self.node.node_type());
            tracing::error!(error = %message, "node failed");
            return NodeRun {
                result: error_result(&self.node, message, started_at, 0, 0),
                files: Vec::new(),
                branch: None,
                cut_off: false,
            };
        };

        let mut attempt = 0u32;
        let mut cut_off = false;
        let mut warnings: Vec<String> = Vec::new();
        let outcome: Result<NodeOutput, ProcessorError> = loop {
            attempt += 1;
            self.events.publish(EngineEvent::NodeStarted {
                run_id,
                node_id: self.node.id.clone(),
                node_name: self.node.name.clone(),
                node_type: self.node.node_type().as_str().to_string(),
                attempt,
            });

            let limit = self
                .node_timeout
                .min(self.exec.deadline().saturating_duration_since(Instant::now()));
            let ctx = NodeContext::new(&self.node, &self.exec, &self.graph, &self.services);
            let invocation = AssertUnwindSafe(processor.process(&ctx)).catch_unwind();

            let result = tokio::select! {
                biased;
                _ = self.exec.cancellation().cancelled() => Err(ProcessorError::Cancelled),
                finished = tokio::time::timeout(limit, invocation) => match finished {
                    Ok(Ok(result)) => result,
                    Ok(Err(panic)) => Err(ProcessorError::Fatal(format!(
                        "processor panicked: {}",
                        panic_message(panic.as_ref())
                    ))),
                    Err(_) => {
                        cut_off = limit < self.node_timeout;
                        Err(ProcessorError::Timeout(limit))
                    }
                },
            };
            for warning in ctx.warnings() {
                if !warnings.contains(&warning) {
                    warnings.push(warning);
                }
            }

            match result {
                Ok(output) => break Ok(output),
                Err(err) if self.policy.should_retry(attempt, &err) => {
                    let delay = self.policy.delay_for(attempt);
                    if Instant::now() + delay >= self.exec.deadline() {
                        tracing::warn!(attempt, error = %err, "no time left for another attempt");
                        cut_off = true;
                        break Err(err);
                    }
                    tracing::warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "node attempt failed, retrying"
                    );
                    self.events.publish(EngineEvent::NodeRetrying {
                        run_id,
                        node_id: self.node.id.clone(),
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        error: err.to_string(),
                    });
                    tokio::select! {
                        biased;
                        _ = self.exec.cancellation().cancelled() => break Err(ProcessorError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => break Err(err),
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        match outcome {
            Ok(output) => {
                tracing::debug!(attempts = attempt, duration_ms, "node completed");
                self.events.publish(EngineEvent::NodeCompleted {
                    run_id,
                    node_id: self.node.id.clone(),
                    node_name: self.node.name.clone(),
                    duration_ms,
                });
                NodeRun {
                    result: NodeResult {
                        node_id: self.node.id.clone(),
                        node_name: self.node.name.clone(),
                        node_type: self.node.node_type(),
                        status: NodeStatus::Success,
                        data: output.data,
                        error: None,
                        started_at,
                        completed_at: Utc::now(),
                        duration_ms,
                        token_usage: output.token_usage,
                        attempts: attempt,
                        warnings,
                    },
                    files: output.files,
                    branch: output.branch,
                    cut_off: false,
                }
            }
            Err(err) => {
                tracing::warn!(attempts = attempt, duration_ms, error = %err, "node failed");
                self.events.publish(EngineEvent::NodeFailed {
                    run_id,
                    node_id: self.node.id.clone(),
                    node_name: self.node.name.clone(),
                    error: err.to_string(),
                });
                let mut result =
                    error_result(&self.node, err.to_string(), started_at, duration_ms, attempt);
                result.warnings = warnings;
                NodeRun {
                    result,
                    files: Vec::new(),
                    branch: None,
                    cut_off,
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn graph(def: serde_json::Value) -> WorkflowGraph {
        let def: WorkflowDefinition = serde_json::from_value(def).unwrap();
        WorkflowGraph::build(&def).unwrap()
    }

    fn state() -> RunState {
        RunState {
            exec: crate::workflow::context::tests::empty_context(),
            aggregator: ResultAggregator::new(Uuid::now_v7(), ExecutionMode::Sync),
            failed: HashSet::new(),
            branch_skipped: HashSet::new(),
            branches: HashMap::new(),
            unreached: Vec::new(),
            cut_off: false,
        }
    }

    fn branching() -> WorkflowGraph {
        graph(json!({
            "nodes": [
                {"id": "c", "name": "C", "type": "CONDITION", "config": {"expression": "true"}},
                {"id": "yes", "name": "Yes", "type": "DATA", "config": {"source": "y"}},
                {"id": "no", "name": "No", "type": "DATA", "config": {"source": "n"}},
                {"id": "m", "name": "M", "type": "MERGE"},
                {"id": "after", "name": "After", "type": "DATA", "config": {"source": "a"}}
            ],
            "edges": [
                {"id": "1", "source": "c", "target": "yes", "sourceHandle": "true"},
                {"id": "2", "source": "c", "target": "no", "sourceHandle": "false"},
                {"id": "3", "source": "yes", "target": "m"},
                {"id": "4", "source": "no", "target": "m"},
                {"id": "5", "source": "no", "target": "after"}
            ]
        }))
    }

    #[test]
    fn untaken_branch_is_skipped_transitively() {
        let graph = branching();
        let mut state = state();
        state.branches.insert("c".into(), "true".into());

        assert_eq!(skip_reason(&graph, graph.node("yes").unwrap(), &state), None);
        assert_eq!(
            skip_reason(&graph, graph.node("no").unwrap(), &state),
            Some(SkipReason::BranchNotTaken)
        );

        state.branch_skipped.insert("no".into());
        // MERGE still has an active edge from "yes".
        assert_eq!(skip_reason(&graph, graph.node("m").unwrap(), &state), None);
        assert_eq!(
            skip_reason(&graph, graph.node("after").unwrap(), &state),
            Some(SkipReason::BranchNotTaken)
        );
    }

    #[test]
    fn failed_dependency_wins() {
        let graph = branching();
        let mut state = state();
        state.failed.insert("yes".into());
        assert_eq!(
            skip_reason(&graph, graph.node("m").unwrap(), &state),
            Some(SkipReason::UpstreamFailed {
                dependency: "Yes".into()
            })
        );
        assert_eq!(skip_reason(&graph, graph.node("c").unwrap(), &state), None);
    }

    #[test]
    fn limits_from_config() {
        let section = EngineSection {
            node_timeout_secs: 5,
            max_backoff_secs: 2,
            repository_timeout_secs: 3,
        };
        let limits = EngineLimits::from_section(&section);
        assert_eq!(limits.node_timeout, Duration::from_secs(5));
        assert_eq!(limits.max_backoff, Duration::from_secs(2));
        assert_eq!(limits.repository_timeout, Duration::from_secs(3));
    }

    #[test]
    fn panic_payloads_are_readable() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
