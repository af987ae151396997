//! End-to-end runs through `WorkflowEngine` with scripted processors.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use nodeflow_core::event::bus::EventBus;
use nodeflow_core::llm::box_provider::BoxLlmProvider;
use nodeflow_core::llm::provider::LlmProvider;
use nodeflow_core::repository::execution::{ExecutionRepository, NoopRepository};
use nodeflow_core::workflow::error::{EngineError, ProcessorError, ValidationError};
use nodeflow_core::workflow::executor::{EngineLimits, WorkflowEngine};
use nodeflow_core::workflow::registry::{
    NodeContext, NodeOutput, NodeProcessor, ProcessorRegistry, ProcessorServices,
};
use nodeflow_types::error::RepositoryError;
use nodeflow_types::event::EngineEvent;
use nodeflow_types::llm::{CompletionRequest, CompletionResponse, LlmError, Usage};
use nodeflow_types::node::{NodeConfig, NodeType};
use nodeflow_types::result::{NodeResult, SkipReason, WorkflowExecutionResult, WorkflowStatus};
use nodeflow_types::workflow::{ExecutionOptions, ParallelErrorStrategy, WorkflowDefinition};
use serde_json::{Map, Value, json};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// DATA processor driven by its `source`: `ok:<v>`, `fail:<msg>`,
/// `flaky:<n>` (transient until the n-th attempt), `sleep:<ms>`, `panic`.
#[derive(Default)]
struct Scripted {
    calls: Mutex<HashMap<String, u32>>,
}

impl Scripted {
    fn calls(&self, node: &str) -> u32 {
        self.calls.lock().unwrap().get(node).copied().unwrap_or(0)
    }

    fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

impl NodeProcessor for Scripted {
    fn node_type(&self) -> NodeType {
        NodeType::Data
    }

    fn process<'a>(
        &'a self,
        ctx: &'a NodeContext<'a>,
    ) -> BoxFuture<'a, Result<NodeOutput, ProcessorError>> {
        Box::pin(async move {
            let NodeConfig::Data(config) = &ctx.node.config else {
                return Err(ProcessorError::InvalidConfig("not a DATA node".into()));
            };
            let attempt = {
                let mut calls = self.calls.lock().unwrap();
                let count = calls.entry(ctx.node.name.clone()).or_insert(0);
                *count += 1;
                *count
            };
            let (verb, arg) = config
                .source
                .split_once(':')
                .unwrap_or((config.source.as_str(), ""));
            match verb {
                "ok" => Ok(NodeOutput::with_result(json!(arg))),
                "fail" => Err(ProcessorError::Fatal(arg.to_string())),
                "flaky" => {
                    let succeed_on: u32 = arg.parse().unwrap();
                    if attempt >= succeed_on {
                        Ok(NodeOutput::with_result(json!(attempt)))
                    } else {
                        Err(ProcessorError::Transient(format!("attempt {attempt}")))
                    }
                }
                "sleep" => {
                    tokio::time::sleep(Duration::from_millis(arg.parse().unwrap())).await;
                    Ok(NodeOutput::with_result(json!("slept")))
                }
                "panic" => panic!("scripted panic"),
                other => Err(ProcessorError::InvalidConfig(format!("unknown verb {other}"))),
            }
        })
    }
}

/// Answers with `echo: <prompt>`; usage is looked up by prompt.
#[derive(Clone, Default)]
struct EchoLlm {
    usage: HashMap<String, (u32, u32)>,
}

impl LlmProvider for EchoLlm {
    fn name(&self) -> &str {
        "echo"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request.user_prompt().unwrap_or_default().to_string();
        let (input_tokens, output_tokens) = self.usage.get(&prompt).copied().unwrap_or((10, 5));
        Ok(CompletionResponse {
            id: "echo-1".into(),
            content: format!("echo: {prompt}"),
            model: request.model.clone(),
            usage: Usage {
                input_tokens,
                output_tokens,
            },
        })
    }
}

#[derive(Clone, Default)]
struct RecordingRepo {
    logs: Arc<Mutex<Vec<(Uuid, String)>>>,
    results: Arc<Mutex<Vec<WorkflowExecutionResult>>>,
}

impl ExecutionRepository for RecordingRepo {
    async fn load_definition(&self, _id: &str) -> Result<WorkflowDefinition, RepositoryError> {
        Err(RepositoryError::NotFound)
    }

    async fn append_execution_log(
        &self,
        run_id: &Uuid,
        result: &NodeResult,
    ) -> Result<(), RepositoryError> {
        self.logs
            .lock()
            .unwrap()
            .push((*run_id, result.node_name.clone()));
        Ok(())
    }

    async fn persist_execution_result(
        &self,
        result: &WorkflowExecutionResult,
    ) -> Result<(), RepositoryError> {
        self.results.lock().unwrap().push(result.clone());
        Ok(())
    }
}

/// Log writes never finish; result writes take `persist_delay`.
#[derive(Clone, Default)]
struct StalledRepo {
    persist_delay: Duration,
}

impl ExecutionRepository for StalledRepo {
    async fn load_definition(&self, _id: &str) -> Result<WorkflowDefinition, RepositoryError> {
        Err(RepositoryError::NotFound)
    }

    async fn append_execution_log(
        &self,
        _run_id: &Uuid,
        _result: &NodeResult,
    ) -> Result<(), RepositoryError> {
        std::future::pending().await
    }

    async fn persist_execution_result(
        &self,
        _result: &WorkflowExecutionResult,
    ) -> Result<(), RepositoryError> {
        tokio::time::sleep(self.persist_delay).await;
        Ok(())
    }
}

fn definition(value: Value) -> WorkflowDefinition {
    serde_json::from_value(value).unwrap()
}

fn data(id: &str, source: &str) -> Value {
    json!({"id": id, "name": id.to_uppercase(), "type": "DATA", "config": {"source": source}})
}

fn edge(source: &str, target: &str) -> Value {
    json!({"id": format!("{source}->{target}"), "source": source, "target": target})
}

fn engine_with(scripted: Arc<Scripted>) -> WorkflowEngine<NoopRepository> {
    let mut registry = ProcessorRegistry::with_builtins();
    registry.register(scripted);
    WorkflowEngine::new(NoopRepository, registry, ProcessorServices::new())
}

fn diamond(b: &str, c: &str, strategy: &str) -> WorkflowDefinition {
    definition(json!({
        "name": "diamond",
        "nodes": [data("a", "ok:a"), data("b", b), data("c", c), data("d", "ok:d")],
        "edges": [edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
        "settings": {"parallelErrorStrategy": strategy, "retryBaseDelayMs": 1}
    }))
}

fn input() -> Map<String, Value> {
    Map::new()
}

// ---------------------------------------------------------------------------
// Linear pipelines
// ---------------------------------------------------------------------------

#[tokio::test]
async fn input_process_output_pipeline() {
    let services = ProcessorServices::new().with_llm(BoxLlmProvider::new(EchoLlm::default()));
    let repo = RecordingRepo::default();
    let engine = WorkflowEngine::new(repo.clone(), ProcessorRegistry::with_builtins(), services);

    let def = definition(json!({
        "name": "需求分析",
        "nodes": [
            {"id": "in", "name": "用户需求", "type": "INPUT",
             "config": {"fields": [{"name": "需求描述", "value": "", "required": true}]}},
            {"id": "ai", "name": "AI处理", "type": "PROCESS",
             "config": {"userPrompt": "分析: {{用户需求.需求描述}}"}},
            {"id": "out", "name": "输出", "type": "OUTPUT",
             "config": {"content": "{{AI处理}}"}}
        ],
        "edges": [edge("in", "ai"), edge("ai", "out")]
    }));

    let mut payload = Map::new();
    payload.insert("需求描述".into(), json!("test"));
    let result = engine
        .execute_workflow(&def, payload, ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.output, json!("echo: 分析: test"));
    assert_eq!(result.total_tokens, 15);
    assert_eq!(result.node_results.len(), 3);
    assert!(result.error.is_none());

    let logs = repo.logs.lock().unwrap();
    assert_eq!(logs.len(), 3);
    assert!(logs.iter().all(|(run_id, _)| *run_id == result.run_id));
    assert_eq!(repo.results.lock().unwrap()[0].run_id, result.run_id);
}

#[tokio::test]
async fn token_usage_sums_across_nodes() {
    let llm = EchoLlm {
        usage: HashMap::from([("first".to_string(), (10, 5)), ("second".to_string(), (20, 0))]),
    };
    let services = ProcessorServices::new().with_llm(BoxLlmProvider::new(llm));
    let engine = WorkflowEngine::new(NoopRepository, ProcessorRegistry::with_builtins(), services);

    let def = definition(json!({
        "nodes": [
            {"id": "p1", "name": "P1", "type": "PROCESS", "config": {"userPrompt": "first"}},
            {"id": "p2", "name": "P2", "type": "PROCESS", "config": {"userPrompt": "second"}},
            {"id": "m", "name": "M", "type": "MERGE", "config": {"strategy": "concat"}}
        ],
        "edges": [edge("p1", "m"), edge("p2", "m")]
    }));
    let result = engine
        .execute_workflow(&def, input(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.total_tokens, 35);
    assert_eq!(result.token_usage.prompt_tokens, 30);
    assert_eq!(result.output, json!("echo: first\n\necho: second"));
}

#[tokio::test]
async fn dependencies_finish_before_dependents_start() {
    let scripted = Arc::new(Scripted::default());
    let engine = engine_with(scripted);
    let def = definition(json!({
        "nodes": [data("a", "sleep:20"), data("b", "sleep:20"), data("c", "ok:c")],
        "edges": [edge("a", "b"), edge("b", "c")]
    }));
    let result = engine
        .execute_workflow(&def, input(), ExecutionOptions::default())
        .await
        .unwrap();

    let a = result.node("A").unwrap();
    let b = result.node("B").unwrap();
    let c = result.node("C").unwrap();
    assert!(a.completed_at <= b.started_at);
    assert!(b.completed_at <= c.started_at);
}

#[tokio::test]
async fn sequential_mode_runs_siblings_one_at_a_time() {
    let scripted = Arc::new(Scripted::default());
    let engine = engine_with(scripted);
    let def = definition(json!({
        "nodes": [data("a", "sleep:30"), data("b", "sleep:30")],
        "edges": [],
        "settings": {"enableParallelExecution": false}
    }));
    let result = engine
        .execute_workflow(&def, input(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Completed);
    let a = result.node("A").unwrap();
    let b = result.node("B").unwrap();
    assert!(a.completed_at <= b.started_at);
    assert_eq!(result.output, json!({"A": "slept", "B": "slept"}));
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cyclic_definition_runs_nothing() {
    let scripted = Arc::new(Scripted::default());
    let engine = engine_with(scripted.clone());
    let def = definition(json!({
        "nodes": [data("a", "ok:a"), data("b", "ok:b")],
        "edges": [edge("a", "b"), edge("b", "a")]
    }));
    let err = engine
        .execute_workflow(&def, input(), ExecutionOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::CycleDetected(_))
    ));
    assert_eq!(scripted.total_calls(), 0);
}

#[tokio::test]
async fn shut_down_engine_refuses_runs() {
    let engine = engine_with(Arc::new(Scripted::default()));
    engine.shutdown();
    let def = definition(json!({"nodes": [data("a", "ok:a")]}));
    let err = engine
        .execute_workflow(&def, input(), ExecutionOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ShuttingDown));
}

// ---------------------------------------------------------------------------
// Error strategies
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fail_fast_stops_the_run() {
    let engine = engine_with(Arc::new(Scripted::default()));
    let result = engine
        .execute_workflow(
            &diamond("fail:boom", "sleep:2000", "fail_fast"),
            input(),
            ExecutionOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert!(result.error.as_deref().unwrap().contains("boom"));
    assert!(result.node("D").is_none());
    assert!(result.node("C").is_none());
    assert!(result.unreached_nodes.contains(&"c".to_string()));
    assert!(result.unreached_nodes.contains(&"d".to_string()));
    assert!(result.total_duration_ms < 2000);
}

#[tokio::test]
async fn continue_skips_dependents_of_failures() {
    let engine = engine_with(Arc::new(Scripted::default()));
    let result = engine
        .execute_workflow(
            &diamond("fail:boom", "ok:c", "continue"),
            input(),
            ExecutionOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert!(result.node("C").unwrap().is_success());
    assert!(result.node("D").is_none());
    assert_eq!(
        result.skipped_nodes[0].reason,
        SkipReason::UpstreamFailed {
            dependency: "B".into()
        }
    );
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.error.as_deref(), Some("node 'B' failed: boom"));
}

#[tokio::test]
async fn collect_reports_every_failure() {
    let engine = engine_with(Arc::new(Scripted::default()));
    let result = engine
        .execute_workflow(
            &diamond("fail:first", "fail:second", "collect"),
            input(),
            ExecutionOptions::default(),
        )
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Failed);
    assert_eq!(result.errors.len(), 2);
    let error = result.error.as_ref().unwrap();
    assert!(error.contains("first"));
    assert!(error.contains("second"));
    assert!(error.contains("; "));
    assert!(result.is_skipped("d"));
}

#[tokio::test]
async fn one_finished_output_completes_the_run() {
    let engine = engine_with(Arc::new(Scripted::default()));
    let def = definition(json!({
        "nodes": [
            data("good", "ok:fine"),
            data("bad", "fail:boom"),
            {"id": "o1", "name": "O1", "type": "OUTPUT", "config": {"content": "{{GOOD}}"}},
            {"id": "o2", "name": "O2", "type": "OUTPUT", "config": {"content": "{{BAD}}"}}
        ],
        "edges": [edge("good", "o1"), edge("bad", "o2")],
        "settings": {"parallelErrorStrategy": "continue"}
    }));
    let result = engine
        .execute_workflow(&def, input(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.output, json!("fine"));
    assert!(result.is_skipped("o2"));
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.error.as_deref(), Some("node 'BAD' failed: boom"));
}

#[tokio::test]
async fn options_override_the_strategy() {
    let engine = engine_with(Arc::new(Scripted::default()));
    let options = ExecutionOptions {
        parallel_error_strategy: Some(ParallelErrorStrategy::Continue),
        ..ExecutionOptions::default()
    };
    let result = engine
        .execute_workflow(&diamond("fail:boom", "ok:c", "fail_fast"), input(), options)
        .await
        .unwrap();
    assert!(result.node("C").is_some());
    assert!(result.is_skipped("d"));
}

// ---------------------------------------------------------------------------
// Retry, timeouts, panics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_failures_retry_up_to_the_budget() {
    let scripted = Arc::new(Scripted::default());
    let engine = engine_with(scripted.clone());
    let def = definition(json!({
        "nodes": [data("recover", "flaky:2"), data("give-up", "flaky:10"), data("fatal", "fail:no")],
        "settings": {"maxRetries": 3, "retryBaseDelayMs": 1, "parallelErrorStrategy": "continue"}
    }));
    let result = engine
        .execute_workflow(&def, input(), ExecutionOptions::default())
        .await
        .unwrap();

    let recovered = result.node("RECOVER").unwrap();
    assert!(recovered.is_success());
    assert_eq!(recovered.attempts, 2);

    let exhausted = result.node("GIVE-UP").unwrap();
    assert!(!exhausted.is_success());
    assert_eq!(exhausted.attempts, 3);
    assert_eq!(scripted.calls("GIVE-UP"), 3);

    assert_eq!(result.node("FATAL").unwrap().attempts, 1);
    assert_eq!(scripted.calls("FATAL"), 1);
}

#[tokio::test]
async fn slow_node_times_out() {
    let engine = engine_with(Arc::new(Scripted::default()));
    let def = definition(json!({
        "nodes": [data("slow", "sleep:5000")],
        "settings": {"nodeTimeoutSeconds": 1, "maxRetries": 1}
    }));
    let result = engine
        .execute_workflow(&def, input(), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Failed);
    let slow = result.node("SLOW").unwrap();
    assert!(slow.error.as_deref().unwrap().contains("timed out"));
}

#[tokio::test]
async fn run_deadline_stops_scheduling() {
    let scripted = Arc::new(Scripted::default());
    let engine = engine_with(scripted.clone());
    let def = definition(json!({
        "nodes": [data("slow", "sleep:5000"), data("after", "ok:late")],
        "edges": [edge("slow", "after")]
    }));
    let options = ExecutionOptions {
        timeout_seconds: Some(1),
        ..ExecutionOptions::default()
    };
    let result = engine.execute_workflow(&def, input(), options).await.unwrap();

    assert_eq!(result.status, WorkflowStatus::Timeout);
    assert_eq!(scripted.calls("AFTER"), 0);
    assert!(result.unreached_nodes.contains(&"after".to_string()));
    assert!(result.total_duration_ms < 5000);
}

#[tokio::test]
async fn finished_run_past_deadline_keeps_its_status() {
    // Both nodes finish at once; the stalled log writes carry the run past
    // its deadline without cutting any node short.
    let repo = StalledRepo::default();
    let mut registry = ProcessorRegistry::with_builtins();
    registry.register(Arc::new(Scripted::default()));
    let engine = WorkflowEngine::new(repo, registry, ProcessorServices::new());
    let def = definition(json!({
        "nodes": [data("bad", "fail:early"), data("good", "ok:fine")],
        "settings": {"parallelErrorStrategy": "continue"}
    }));
    let options = ExecutionOptions {
        timeout_seconds: Some(1),
        ..ExecutionOptions::default()
    };
    let result = engine.execute_workflow(&def, input(), options).await.unwrap();

    assert!(result.total_duration_ms >= 900);
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert_eq!(result.error.as_deref(), Some("node 'BAD' failed: early"));
    assert!(result.unreached_nodes.is_empty());
}

#[tokio::test]
async fn stalled_repository_cannot_hold_the_run() {
    let repo = StalledRepo {
        persist_delay: Duration::from_secs(3600),
    };
    let mut registry = ProcessorRegistry::with_builtins();
    registry.register(Arc::new(Scripted::default()));
    let engine = WorkflowEngine::new(repo, registry, ProcessorServices::new()).with_limits(
        EngineLimits {
            repository_timeout: Duration::from_millis(200),
            ..EngineLimits::default()
        },
    );
    let def = definition(json!({
        "nodes": [data("a", "ok:a"), data("b", "ok:b")],
        "edges": [edge("a", "b")]
    }));
    let options = ExecutionOptions {
        timeout_seconds: Some(1),
        ..ExecutionOptions::default()
    };

    let started = std::time::Instant::now();
    let result = engine.execute_workflow(&def, input(), options).await.unwrap();

    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(result.status, WorkflowStatus::Completed);
    assert!(result.node("B").unwrap().is_success());
}

#[tokio::test]
async fn panicking_processor_fails_only_its_node() {
    let engine = engine_with(Arc::new(Scripted::default()));
    let def = definition(json!({
        "nodes": [data("bad", "panic"), data("good", "ok:fine")],
        "settings": {"parallelErrorStrategy": "continue"}
    }));
    let result = engine
        .execute_workflow(&def, input(), ExecutionOptions::default())
        .await
        .unwrap();

    let bad = result.node("BAD").unwrap();
    assert!(bad.error.as_deref().unwrap().contains("scripted panic"));
    assert!(result.node("GOOD").unwrap().is_success());

    // The engine stays usable.
    let again = engine
        .execute_workflow(
            &definition(json!({"nodes": [data("x", "ok:x")]})),
            input(),
            ExecutionOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(again.status, WorkflowStatus::Completed);
}

// ---------------------------------------------------------------------------
// Branching
// ---------------------------------------------------------------------------

#[tokio::test]
async fn condition_routes_one_branch() {
    let engine = engine_with(Arc::new(Scripted::default()));
    let def = definition(json!({
        "nodes": [
            {"id": "check", "name": "check", "type": "CONDITION",
             "config": {"expression": "input.score > 5"}},
            data("hi", "ok:high"),
            data("lo", "ok:low"),
            data("lo2", "ok:lower")
        ],
        "edges": [
            {"id": "t", "source": "check", "target": "hi", "sourceHandle": "true"},
            {"id": "f", "source": "check", "target": "lo", "sourceHandle": "false"},
            edge("lo", "lo2")
        ]
    }));
    let mut payload = Map::new();
    payload.insert("score".into(), json!(9));
    let result = engine
        .execute_workflow(&def, payload, ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, WorkflowStatus::Completed);
    assert!(result.node("HI").is_some());
    assert!(result.node("LO").is_none());
    assert!(result.is_skipped("lo"));
    assert!(result.is_skipped("lo2"));
    assert!(
        result
            .skipped_nodes
            .iter()
            .all(|s| s.reason == SkipReason::BranchNotTaken)
    );
    assert_eq!(result.output, json!("high"));
}

// ---------------------------------------------------------------------------
// Cancellation and events
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cancel_stops_a_running_workflow() {
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let engine = Arc::new(engine_with(Arc::new(Scripted::default())).with_event_bus(bus));

    let def = definition(json!({
        "nodes": [data("slow", "sleep:5000"), data("after", "ok:never")],
        "edges": [edge("slow", "after")]
    }));
    let run_id = Uuid::now_v7();
    let runner = Arc::clone(&engine);
    let handle = tokio::spawn(async move {
        runner
            .execute_with_run_id(run_id, &def, Map::new(), ExecutionOptions::default())
            .await
    });

    loop {
        match events.recv().await.unwrap() {
            EngineEvent::NodeStarted { node_id, .. } if node_id == "slow" => break,
            _ => {}
        }
    }
    assert_eq!(engine.active_runs(), vec![run_id]);
    assert!(engine.cancel(run_id));

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(result.status, WorkflowStatus::Cancelled);
    assert!(result.unreached_nodes.contains(&"after".to_string()));
    assert!(engine.active_runs().is_empty());
    assert!(!engine.cancel(run_id));
}

#[tokio::test]
async fn lifecycle_events_are_published() {
    let bus = EventBus::new(64);
    let mut events = bus.subscribe();
    let engine = engine_with(Arc::new(Scripted::default())).with_event_bus(bus);
    let def = definition(json!({
        "nodes": [data("a", "ok:a"), data("b", "fail:x")],
        "edges": [edge("a", "b")]
    }));
    let result = engine
        .execute_workflow(&def, input(), ExecutionOptions::default())
        .await
        .unwrap();

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert_eq!(event.run_id(), result.run_id);
        kinds.push(serde_json::to_value(&event).unwrap()["type"].as_str().unwrap().to_string());
    }
    assert_eq!(kinds.first().map(String::as_str), Some("run_started"));
    assert_eq!(kinds.last().map(String::as_str), Some("run_finished"));
    assert!(kinds.contains(&"node_completed".to_string()));
    assert!(kinds.contains(&"node_failed".to_string()));
}
