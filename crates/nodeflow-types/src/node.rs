//! Node definitions and their typed configuration payloads.
//!
//! On the wire a node is `{id, name, type, position?, config}` with a loosely
//! shaped `config` object. In memory the `config` becomes a closed
//! [`NodeConfig`] enum with one concrete payload per [`NodeType`], so every
//! dispatch over node kinds is checked exhaustively at compile time.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::knowledge::RagConfig;

// ---------------------------------------------------------------------------
// Node Type
// ---------------------------------------------------------------------------

/// The declared kind of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Input,
    Process,
    Code,
    Data,
    Image,
    Video,
    Audio,
    Output,
    Http,
    Condition,
    Loop,
    Merge,
    Switch,
    Notification,
}

impl NodeType {
    /// Every built-in node type.
    pub const ALL: [NodeType; 14] = [
        NodeType::Input,
        NodeType::Process,
        NodeType::Code,
        NodeType::Data,
        NodeType::Image,
        NodeType::Video,
        NodeType::Audio,
        NodeType::Output,
        NodeType::Http,
        NodeType::Condition,
        NodeType::Loop,
        NodeType::Merge,
        NodeType::Switch,
        NodeType::Notification,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Input => "INPUT",
            NodeType::Process => "PROCESS",
            NodeType::Code => "CODE",
            NodeType::Data => "DATA",
            NodeType::Image => "IMAGE",
            NodeType::Video => "VIDEO",
            NodeType::Audio => "AUDIO",
            NodeType::Output => "OUTPUT",
            NodeType::Http => "HTTP",
            NodeType::Condition => "CONDITION",
            NodeType::Loop => "LOOP",
            NodeType::Merge => "MERGE",
            NodeType::Switch => "SWITCH",
            NodeType::Notification => "NOTIFICATION",
        }
    }

    /// Whether nodes of this type select an outgoing branch.
    pub fn is_branching(&self) -> bool {
        matches!(self, NodeType::Condition | NodeType::Switch)
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Node Definition
// ---------------------------------------------------------------------------

/// Canvas position. Carried through for round-tripping, ignored by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// A typed unit of work in a workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNodeDefinition", into = "RawNodeDefinition")]
pub struct NodeDefinition {
    /// Unique id within the definition; edges refer to it.
    pub id: String,
    /// Unique display name; templates refer to it.
    pub name: String,
    pub position: Option<Position>,
    pub config: NodeConfig,
}

impl NodeDefinition {
    pub fn node_type(&self) -> NodeType {
        self.config.node_type()
    }
}

/// Wire shape of a node before its config is typed.
#[derive(Serialize, Deserialize)]
struct RawNodeDefinition {
    id: String,
    name: String,
    #[serde(rename = "type")]
    node_type: NodeType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    position: Option<Position>,
    #[serde(default)]
    config: Value,
}

impl TryFrom<RawNodeDefinition> for NodeDefinition {
    type Error = NodeConfigError;

    fn try_from(raw: RawNodeDefinition) -> Result<Self, Self::Error> {
        let config = NodeConfig::from_value(raw.node_type, raw.config).map_err(|e| {
            NodeConfigError {
                node_id: raw.id.clone(),
                node_type: raw.node_type,
                message: e.to_string(),
            }
        })?;
        Ok(NodeDefinition {
            id: raw.id,
            name: raw.name,
            position: raw.position,
            config,
        })
    }
}

impl From<NodeDefinition> for RawNodeDefinition {
    fn from(node: NodeDefinition) -> Self {
        RawNodeDefinition {
            node_type: node.node_type(),
            config: node.config.to_value(),
            id: node.id,
            name: node.name,
            position: node.position,
        }
    }
}

/// A node's `config` did not match the payload its type requires.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid config for {node_type} node '{node_id}': {message}")]
pub struct NodeConfigError {
    pub node_id: String,
    pub node_type: NodeType,
    pub message: String,
}

// ---------------------------------------------------------------------------
// Node Config (closed sum)
// ---------------------------------------------------------------------------

/// Typed configuration, one variant per [`NodeType`].
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    Input(InputConfig),
    Process(ProcessConfig),
    Code(CodeConfig),
    Data(DataConfig),
    Image(MediaConfig),
    Video(MediaConfig),
    Audio(MediaConfig),
    Output(OutputConfig),
    Http(HttpConfig),
    Condition(ConditionConfig),
    Loop(LoopConfig),
    Merge(MergeConfig),
    Switch(SwitchConfig),
    Notification(NotificationConfig),
}

impl NodeConfig {
    pub fn node_type(&self) -> NodeType {
        match self {
            NodeConfig::Input(_) => NodeType::Input,
            NodeConfig::Process(_) => NodeType::Process,
            NodeConfig::Code(_) => NodeType::Code,
            NodeConfig::Data(_) => NodeType::Data,
            NodeConfig::Image(_) => NodeType::Image,
            NodeConfig::Video(_) => NodeType::Video,
            NodeConfig::Audio(_) => NodeType::Audio,
            NodeConfig::Output(_) => NodeType::Output,
            NodeConfig::Http(_) => NodeType::Http,
            NodeConfig::Condition(_) => NodeType::Condition,
            NodeConfig::Loop(_) => NodeType::Loop,
            NodeConfig::Merge(_) => NodeType::Merge,
            NodeConfig::Switch(_) => NodeType::Switch,
            NodeConfig::Notification(_) => NodeType::Notification,
        }
    }

    /// Type the untyped `config` object of a node of kind `node_type`.
    ///
    /// A missing config (`null`) is treated as an empty object so that
    /// payloads made entirely of defaults need not be spelled out.
    pub fn from_value(node_type: NodeType, value: Value) -> Result<Self, serde_json::Error> {
        let value = match value {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        Ok(match node_type {
            NodeType::Input => NodeConfig::Input(serde_json::from_value(value)?),
            NodeType::Process => NodeConfig::Process(serde_json::from_value(value)?),
            NodeType::Code => NodeConfig::Code(serde_json::from_value(value)?),
            NodeType::Data => NodeConfig::Data(serde_json::from_value(value)?),
            NodeType::Image => NodeConfig::Image(serde_json::from_value(value)?),
            NodeType::Video => NodeConfig::Video(serde_json::from_value(value)?),
            NodeType::Audio => NodeConfig::Audio(serde_json::from_value(value)?),
            NodeType::Output => NodeConfig::Output(serde_json::from_value(value)?),
            NodeType::Http => NodeConfig::Http(serde_json::from_value(value)?),
            NodeType::Condition => NodeConfig::Condition(serde_json::from_value(value)?),
            NodeType::Loop => NodeConfig::Loop(serde_json::from_value(value)?),
            NodeType::Merge => NodeConfig::Merge(serde_json::from_value(value)?),
            NodeType::Switch => NodeConfig::Switch(serde_json::from_value(value)?),
            NodeType::Notification => NodeConfig::Notification(serde_json::from_value(value)?),
        })
    }

    /// The config as an untyped JSON object.
    pub fn to_value(&self) -> Value {
        let result = match self {
            NodeConfig::Input(c) => serde_json::to_value(c),
            NodeConfig::Process(c) => serde_json::to_value(c),
            NodeConfig::Code(c) => serde_json::to_value(c),
            NodeConfig::Data(c) => serde_json::to_value(c),
            NodeConfig::Image(c) | NodeConfig::Video(c) | NodeConfig::Audio(c) => {
                serde_json::to_value(c)
            }
            NodeConfig::Output(c) => serde_json::to_value(c),
            NodeConfig::Http(c) => serde_json::to_value(c),
            NodeConfig::Condition(c) => serde_json::to_value(c),
            NodeConfig::Loop(c) => serde_json::to_value(c),
            NodeConfig::Merge(c) => serde_json::to_value(c),
            NodeConfig::Switch(c) => serde_json::to_value(c),
            NodeConfig::Notification(c) => serde_json::to_value(c),
        };
        // Plain derived structs with string keys always serialize.
        result.unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Payloads
// ---------------------------------------------------------------------------

/// INPUT: named fields seeded from the invocation payload or defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputConfig {
    #[serde(default)]
    pub fields: Vec<InputField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputField {
    pub name: String,
    /// Default value; strings may contain templates.
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Expected shape of an AI completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    #[default]
    Text,
    Json,
}

/// PROCESS: one AI completion, optionally retrieval-augmented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub user_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub knowledge_base_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_config: Option<RagConfig>,
    #[serde(default)]
    pub output_format: ResponseFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeLanguage {
    #[default]
    Javascript,
    Python,
}

impl CodeLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeLanguage::Javascript => "javascript",
            CodeLanguage::Python => "python",
        }
    }
}

/// CODE: a snippet run by the sandbox collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeConfig {
    #[serde(default)]
    pub language: CodeLanguage,
    pub code: String,
    /// Input name -> template. A single-token template passes the typed value.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub inputs: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    Json,
    Csv,
    Lines,
    #[default]
    Text,
}

/// DATA: parse resolved text into structured data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataConfig {
    pub source: String,
    #[serde(default)]
    pub format: DataFormat,
    /// CSV delimiter (single byte, default `,`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
}

/// IMAGE / VIDEO / AUDIO: media references with optional AI analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaConfig {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Text,
    Markdown,
    Json,
    Html,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text",
            OutputFormat::Markdown => "markdown",
            OutputFormat::Json => "json",
            OutputFormat::Html => "html",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            OutputFormat::Text => "text/plain",
            OutputFormat::Markdown => "text/markdown",
            OutputFormat::Json => "application/json",
            OutputFormat::Html => "text/html",
        }
    }
}

/// OUTPUT: the run's deliverable, optionally stored as a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputConfig {
    pub content: String,
    #[serde(default)]
    pub format: OutputFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// HTTP: one outbound request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HttpConfig {
    #[serde(default)]
    pub method: HttpMethod,
    pub url: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

/// CONDITION: boolean expression selecting the `"true"` or `"false"` handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionConfig {
    pub expression: String,
}

/// SWITCH: expression whose value selects a case handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchConfig {
    pub expression: String,
    #[serde(default)]
    pub cases: Vec<SwitchCase>,
    #[serde(default = "default_switch_handle")]
    pub default_handle: String,
}

fn default_switch_handle() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub value: Value,
    pub handle: String,
}

/// LOOP: iterate over an array, templating or prompting per item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopConfig {
    pub items: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_max_iterations() -> usize {
    100
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    #[default]
    Object,
    Array,
    Concat,
}

/// MERGE: combine the outputs of direct predecessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConfig {
    #[serde(default)]
    pub strategy: MergeStrategy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub separator: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationChannel {
    #[default]
    Log,
    Webhook,
}

/// NOTIFICATION: tell someone the run reached this point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationConfig {
    #[serde(default)]
    pub channel: NotificationChannel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default)]
    pub title: String,
    pub message: String,
}
