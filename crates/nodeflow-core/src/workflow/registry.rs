//! Node processor registry.
//!
//! Maps each [`NodeType`] to the [`NodeProcessor`] that executes it. The
//! built-in table is produced by an exhaustive match, so adding a node type
//! without a handler fails to compile. Embedders can replace or add
//! handlers with [`ProcessorRegistry::register`] without touching the
//! orchestrator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures_util::future::BoxFuture;
use nodeflow_types::node::{NodeDefinition, NodeType};
use nodeflow_types::result::{NodeResult, TokenUsage};
use nodeflow_types::storage::OutputFile;
use serde_json::{Map, Value};

use crate::http::HttpClient;
use crate::knowledge::box_retriever::BoxKnowledgeRetriever;
use crate::llm::box_provider::BoxLlmProvider;
use crate::sandbox::CodeSandbox;
use crate::storage::ArtifactStore;

use super::context::ExecutionContext;
use super::error::ProcessorError;
use super::graph::WorkflowGraph;
use super::processors;
use super::template::{self, Scope};

// ---------------------------------------------------------------------------
// Processor contract
// ---------------------------------------------------------------------------

/// What a processor hands back on success.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutput {
    pub data: Map<String, Value>,
    pub token_usage: Option<TokenUsage>,
    pub files: Vec<OutputFile>,
    /// Selected outgoing handle, for branching nodes.
    pub branch: Option<String>,
}

impl NodeOutput {
    /// Output whose canonical `result` key holds `value`.
    pub fn with_result(value: Value) -> Self {
        let mut data = Map::new();
        data.insert("result".into(), value);
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn insert(mut self, key: &str, value: Value) -> Self {
        self.data.insert(key.to_string(), value);
        self
    }

    pub fn tokens(mut self, usage: Option<TokenUsage>) -> Self {
        self.token_usage = usage;
        self
    }

    pub fn branch(mut self, handle: impl Into<String>) -> Self {
        self.branch = Some(handle.into());
        self
    }

    pub fn file(mut self, file: OutputFile) -> Self {
        self.files.push(file);
        self
    }
}

/// Handler for one node type.
pub trait NodeProcessor: Send + Sync {
    fn node_type(&self) -> NodeType;

    /// Execute `ctx.node`. Errors become the node's error result.
    fn process<'a>(
        &'a self,
        ctx: &'a NodeContext<'a>,
    ) -> BoxFuture<'a, Result<NodeOutput, ProcessorError>>;
}

// ---------------------------------------------------------------------------
// Collaborators
// ---------------------------------------------------------------------------

/// External collaborators available to processors. Absent collaborators
/// make the processors that need them fail with a configuration error.
#[derive(Clone, Default)]
pub struct ProcessorServices {
    pub llm: Option<Arc<BoxLlmProvider>>,
    pub retriever: Option<Arc<BoxKnowledgeRetriever>>,
    pub sandbox: Option<Arc<dyn CodeSandbox>>,
    pub http: Option<Arc<dyn HttpClient>>,
    pub store: Option<Arc<dyn ArtifactStore>>,
}

impl ProcessorServices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_llm(mut self, llm: BoxLlmProvider) -> Self {
        self.llm = Some(Arc::new(llm));
        self
    }

    pub fn with_retriever(mut self, retriever: BoxKnowledgeRetriever) -> Self {
        self.retriever = Some(Arc::new(retriever));
        self
    }

    pub fn with_sandbox(mut self, sandbox: Arc<dyn CodeSandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    pub fn with_http(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn llm(&self) -> Result<&BoxLlmProvider, ProcessorError> {
        self.llm
            .as_deref()
            .ok_or_else(|| ProcessorError::InvalidConfig("no AI completion provider configured".into()))
    }

    pub fn sandbox(&self) -> Result<&dyn CodeSandbox, ProcessorError> {
        self.sandbox
            .as_deref()
            .ok_or_else(|| ProcessorError::InvalidConfig("no code sandbox configured".into()))
    }

    pub fn http(&self) -> Result<&dyn HttpClient, ProcessorError> {
        self.http
            .as_deref()
            .ok_or_else(|| ProcessorError::InvalidConfig("no HTTP client configured".into()))
    }

    pub fn store(&self) -> Result<&dyn ArtifactStore, ProcessorError> {
        self.store
            .as_deref()
            .ok_or_else(|| ProcessorError::InvalidConfig("no artifact store configured".into()))
    }
}

impl std::fmt::Debug for ProcessorServices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessorServices")
            .field("llm", &self.llm.as_ref().map(|l| l.name().to_string()))
            .field("retriever", &self.retriever.is_some())
            .field("sandbox", &self.sandbox.is_some())
            .field("http", &self.http.is_some())
            .field("store", &self.store.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Node context
// ---------------------------------------------------------------------------

/// Everything one processor invocation may read.
pub struct NodeContext<'a> {
    pub node: &'a NodeDefinition,
    pub exec: &'a ExecutionContext,
    pub graph: &'a WorkflowGraph,
    pub services: &'a ProcessorServices,
    warnings: Mutex<Vec<String>>,
}

impl<'a> NodeContext<'a> {
    pub fn new(
        node: &'a NodeDefinition,
        exec: &'a ExecutionContext,
        graph: &'a WorkflowGraph,
        services: &'a ProcessorServices,
    ) -> Self {
        Self {
            node,
            exec,
            graph,
            services,
            warnings: Mutex::new(Vec::new()),
        }
    }

    /// Resolve a template against the run's outputs, recording misses.
    pub fn resolve(&self, template: &str) -> String {
        self.resolve_in(template, self.exec)
    }

    /// Resolve against a custom scope (e.g. a loop iteration).
    pub fn resolve_in(&self, template: &str, scope: &dyn Scope) -> String {
        let resolution = template::resolve(template, scope);
        self.note(resolution.unresolved);
        resolution.text
    }

    /// Resolve keeping the referenced value's type for single-token templates.
    pub fn resolve_value(&self, template: &str) -> Value {
        let (value, unresolved) = template::resolve_value(template, self.exec);
        self.note(unresolved);
        value
    }

    /// Resolve every string inside a JSON value, recursively.
    pub fn resolve_json(&self, value: &Value) -> Value {
        match value {
            Value::String(s) if !template::has_tokens(s) => value.clone(),
            Value::String(s) => self.resolve_value(s),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.resolve_json(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve_json(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Results of direct predecessors that succeeded, in edge order.
    pub fn predecessor_results(&self) -> Vec<&NodeResult> {
        self.graph
            .predecessors(&self.node.id)
            .into_iter()
            .filter_map(|p| self.exec.output(&p.name))
            .collect()
    }

    fn note(&self, unresolved: Vec<String>) {
        if unresolved.is_empty() {
            return;
        }
        if let Ok(mut warnings) = self.warnings.lock() {
            for token in unresolved {
                if !warnings.contains(&token) {
                    warnings.push(token);
                }
            }
        }
    }

    /// Unresolved tokens seen so far.
    pub fn warnings(&self) -> Vec<String> {
        self.warnings
            .lock()
            .map(|w| w.clone())
            .unwrap_or_default()
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<NodeType, Arc<dyn NodeProcessor>>,
}

impl ProcessorRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self {
            processors: HashMap::new(),
        }
    }

    /// A registry with a built-in handler for every node type.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for node_type in NodeType::ALL {
            registry.register(builtin(node_type));
        }
        registry
    }

    /// Register `processor` for its node type, replacing any previous one.
    pub fn register(&mut self, processor: Arc<dyn NodeProcessor>) -> &mut Self {
        self.processors.insert(processor.node_type(), processor);
        self
    }

    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeProcessor>> {
        self.processors.get(&node_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.processors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processors.is_empty()
    }
}

impl Default for ProcessorRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.processors.keys().collect();
        types.sort();
        f.debug_struct("ProcessorRegistry")
            .field("types", &types)
            .finish()
    }
}

fn builtin(node_type: NodeType) -> Arc<dyn NodeProcessor> {
    match node_type {
        NodeType::Input => Arc::new(processors::input::InputProcessor),
        NodeType::Process => Arc::new(processors::ai::AiProcessor),
        NodeType::Code => Arc::new(processors::code::CodeProcessor),
        NodeType::Data => Arc::new(processors::data::DataProcessor),
        NodeType::Image | NodeType::Video | NodeType::Audio => {
            Arc::new(processors::media::MediaProcessor::new(node_type))
        }
        NodeType::Output => Arc::new(processors::output::OutputProcessor),
        NodeType::Http => Arc::new(processors::http::HttpProcessor),
        NodeType::Condition => Arc::new(processors::branch::ConditionProcessor),
        NodeType::Switch => Arc::new(processors::branch::SwitchProcessor),
        NodeType::Loop => Arc::new(processors::iterate::LoopProcessor),
        NodeType::Merge => Arc::new(processors::merge::MergeProcessor),
        NodeType::Notification => Arc::new(processors::notify::NotificationProcessor),
    }
}
