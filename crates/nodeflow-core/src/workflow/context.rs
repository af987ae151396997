//! Per-run execution context.
//!
//! `ExecutionContext` is cheap to clone: every field is shared behind an
//! `Arc`. Node tasks receive a clone and only ever read it. The orchestrator
//! holds the master copy and is the only writer of node outputs, appending
//! between levels once the tasks holding older clones have finished, so
//! readers see either "absent" or a complete, immutable [`NodeResult`].

use std::collections::HashMap;
use std::sync::Arc;

use nodeflow_types::knowledge::KnowledgeConfig;
use nodeflow_types::llm::AiConfig;
use nodeflow_types::result::NodeResult;
use nodeflow_types::workflow::WorkflowDefinition;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::template::{Producer, Scope};

// ---------------------------------------------------------------------------
// Node outputs
// ---------------------------------------------------------------------------

/// Append-only results of successful nodes, indexed by node name.
#[derive(Debug, Clone, Default)]
pub struct NodeOutputs {
    by_name: HashMap<String, Arc<NodeResult>>,
    order: Vec<String>,
}

/// A node tried to write its output twice.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("output for node '{0}' already recorded")]
pub struct DuplicateOutput(pub String);

impl NodeOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a node's result. Each name is written exactly once.
    pub fn insert(&mut self, result: Arc<NodeResult>) -> Result<(), DuplicateOutput> {
        if self.by_name.contains_key(&result.node_name) {
            return Err(DuplicateOutput(result.node_name.clone()));
        }
        self.order.push(result.node_name.clone());
        self.by_name.insert(result.node_name.clone(), result);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<NodeResult>> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Results in completion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<NodeResult>> {
        self.order.iter().filter_map(|name| self.by_name.get(name))
    }
}

// ---------------------------------------------------------------------------
// Execution context
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    run_id: Uuid,
    input: Arc<Map<String, Value>>,
    global_variables: Arc<Map<String, Value>>,
    outputs: Arc<NodeOutputs>,
    deadline: Instant,
    ai_config: Arc<AiConfig>,
    knowledge_config: Arc<KnowledgeConfig>,
    cancellation: CancellationToken,
}

impl ExecutionContext {
    /// Context for a new run of `definition` that must finish by `deadline`.
    pub fn new(
        run_id: Uuid,
        definition: &WorkflowDefinition,
        input: Map<String, Value>,
        deadline: Instant,
    ) -> Self {
        Self {
            run_id,
            input: Arc::new(input),
            global_variables: Arc::new(definition.global_variables.clone()),
            outputs: Arc::new(NodeOutputs::new()),
            deadline,
            ai_config: Arc::new(AiConfig::default()),
            knowledge_config: Arc::new(KnowledgeConfig::default()),
            cancellation: CancellationToken::new(),
        }
    }

    pub fn with_ai_config(mut self, config: Arc<AiConfig>) -> Self {
        self.ai_config = config;
        self
    }

    pub fn with_knowledge_config(mut self, config: Arc<KnowledgeConfig>) -> Self {
        self.knowledge_config = config;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn input(&self) -> &Map<String, Value> {
        &self.input
    }

    pub fn global_variables(&self) -> &Map<String, Value> {
        &self.global_variables
    }

    pub fn outputs(&self) -> &NodeOutputs {
        &self.outputs
    }

    pub fn output(&self, node_name: &str) -> Option<&NodeResult> {
        self.outputs.get(node_name).map(Arc::as_ref)
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    pub fn is_past_deadline(&self) -> bool {
        Instant::now() >= self.deadline
    }

    pub fn ai_config(&self) -> &AiConfig {
        &self.ai_config
    }

    pub fn knowledge_config(&self) -> &KnowledgeConfig {
        &self.knowledge_config
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Append a successful node's result.
    ///
    /// Copies the output index only if a node task still holds an older
    /// snapshot; otherwise the append happens in place.
    pub fn record_output(&mut self, result: Arc<NodeResult>) -> Result<(), DuplicateOutput> {
        Arc::make_mut(&mut self.outputs).insert(result)
    }

    /// JSON object that CONDITION and SWITCH expressions evaluate against.
    ///
    /// Shape:
    /// ```json
    /// {
    ///   "nodes": { "<node name>": { ...data } },
    ///   "input": { ... },
    ///   "globals": { ... },
    ///   "<node name>": { ...data },   // for ASCII-named nodes
    ///   "<global key>": ...
    /// }
    /// ```
    pub fn expression_context(&self) -> Value {
        let nodes: Map<String, Value> = self
            .outputs
            .iter()
            .map(|r| (r.node_name.clone(), Value::Object(r.data.clone())))
            .collect();

        let mut root = Map::new();
        for (key, value) in self.global_variables.iter() {
            root.insert(key.clone(), value.clone());
        }
        for (name, data) in &nodes {
            root.insert(name.clone(), data.clone());
        }
        root.insert("nodes".into(), Value::Object(nodes));
        root.insert("input".into(), Value::Object((*self.input).clone()));
        root.insert(
            "globals".into(),
            Value::Object((*self.global_variables).clone()),
        );
        Value::Object(root)
    }
}

/// Precedence: node outputs by name, then global variables, then `input`.
impl Scope for ExecutionContext {
    fn producer(&self, name: &str) -> Option<Producer<'_>> {
        if let Some(result) = self.outputs.get(name) {
            return Some(Producer::Fields(&result.data));
        }
        if let Some(value) = self.global_variables.get(name) {
            return Some(Producer::Value(value));
        }
        if name == "input" {
            return Some(Producer::Fields(&self.input));
        }
        None
    }
}
