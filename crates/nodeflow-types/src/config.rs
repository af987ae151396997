//! Engine configuration types.
//!
//! `EngineConfig` represents the top-level `config.toml` that controls
//! engine defaults and the collaborators wired in by the entry point.
//! Every section and field has a default, so an empty file is valid.

use serde::{Deserialize, Serialize};

use crate::knowledge::{KnowledgeConfig, RagConfig};
use crate::llm::AiConfig;
use crate::workflow::DEFAULT_NODE_TIMEOUT_SECS;

/// Top-level configuration, loaded from `~/.nodeflow/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub ai: AiSection,
    #[serde(default)]
    pub knowledge: KnowledgeSection,
    #[serde(default)]
    pub sandbox: SandboxSection,
    #[serde(default)]
    pub storage: StorageSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Orchestrator limits. Per-definition settings cover everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Node timeout for definitions without `nodeTimeoutSeconds`.
    #[serde(default = "default_node_timeout_secs")]
    pub node_timeout_secs: u64,
    /// Ceiling for a single backoff delay.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,
    /// Bound on one execution log or result write.
    #[serde(default = "default_repository_timeout_secs")]
    pub repository_timeout_secs: u64,
}

fn default_node_timeout_secs() -> u64 {
    DEFAULT_NODE_TIMEOUT_SECS
}

fn default_max_backoff_secs() -> u64 {
    60
}

fn default_repository_timeout_secs() -> u64 {
    10
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            node_timeout_secs: default_node_timeout_secs(),
            max_backoff_secs: default_max_backoff_secs(),
            repository_timeout_secs: default_repository_timeout_secs(),
        }
    }
}

/// OpenAI-compatible completion provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiSection {
    #[serde(default = "default_provider_name")]
    pub provider_name: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Environment variable holding the API key. The key itself never lives
    /// in the config file.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_provider_name() -> String {
    "openai".to_string()
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for AiSection {
    fn default() -> Self {
        Self {
            provider_name: default_provider_name(),
            base_url: default_base_url(),
            api_key_env: default_api_key_env(),
            default_model: default_model(),
            temperature: None,
            max_tokens: None,
        }
    }
}

impl AiSection {
    /// The per-run snapshot handed to processors.
    pub fn snapshot(&self) -> AiConfig {
        AiConfig {
            provider: self.provider_name.clone(),
            default_model: self.default_model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

/// Retrieval service settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KnowledgeSection {
    /// Base URL of the retrieval service; retrieval is disabled when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub defaults: RagConfig,
}

impl KnowledgeSection {
    pub fn snapshot(&self) -> KnowledgeConfig {
        KnowledgeConfig {
            enabled: self.endpoint.is_some(),
            defaults: self.defaults.clone(),
        }
    }
}

/// Subprocess sandbox limits for CODE nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxSection {
    #[serde(default = "default_python_bin")]
    pub python_bin: String,
    #[serde(default = "default_node_bin")]
    pub node_bin: String,
    #[serde(default = "default_sandbox_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_log_lines")]
    pub max_log_lines: usize,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

fn default_python_bin() -> String {
    "python3".to_string()
}

fn default_node_bin() -> String {
    "node".to_string()
}

fn default_sandbox_timeout_secs() -> u64 {
    30
}

fn default_max_log_lines() -> usize {
    100
}

fn default_max_output_bytes() -> usize {
    1024 * 1024
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            python_bin: default_python_bin(),
            node_bin: default_node_bin(),
            timeout_secs: default_sandbox_timeout_secs(),
            max_log_lines: default_max_log_lines(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSection {
    /// Directory for OUTPUT artifacts; `<data_dir>/outputs` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSection {
    /// SQLite URL; `sqlite://<data_dir>/nodeflow.db?mode=rwc` when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Log output format and exporters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable text.
    #[serde(default)]
    pub json: bool,
    /// Export spans through the OpenTelemetry stdout exporter.
    #[serde(default)]
    pub otel: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.node_timeout_secs, 300);
        assert_eq!(config.engine.max_backoff_secs, 60);
        assert_eq!(config.ai.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.sandbox.max_log_lines, 100);
        assert!(config.knowledge.endpoint.is_none());
        assert!(!config.logging.json);
    }

    #[test]
    fn test_partial_sections() {
        let toml_str = r#"
[engine]
max_backoff_secs = 5

[ai]
default_model = "qwen-plus"
base_url = "https://dashscope.example.com/v1"

[knowledge]
endpoint = "http://localhost:9000"

[knowledge.defaults]
topK = 8
"#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.engine.max_backoff_secs, 5);
        assert_eq!(config.engine.node_timeout_secs, 300);
        assert_eq!(config.ai.default_model, "qwen-plus");
        assert_eq!(config.ai.provider_name, "openai");

        let knowledge = config.knowledge.snapshot();
        assert!(knowledge.enabled);
        assert_eq!(knowledge.defaults.top_k, 8);
        assert_eq!(knowledge.defaults.max_context_tokens, 2000);
    }

    #[test]
    fn test_ai_snapshot() {
        let section = AiSection {
            temperature: Some(0.2),
            ..Default::default()
        };
        let snapshot = section.snapshot();
        assert_eq!(snapshot.default_model, "gpt-4o-mini");
        assert_eq!(snapshot.temperature, Some(0.2));
    }
}
