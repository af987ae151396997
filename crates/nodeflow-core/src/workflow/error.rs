//! Error types for the workflow engine.
//!
//! Validation and definition errors are raised before any node runs.
//! Processor errors never escape a run: the orchestrator turns them into
//! error `NodeResult`s, classifying each as retryable or not.

use std::time::Duration;

use nodeflow_types::error::RepositoryError;
use nodeflow_types::llm::LlmError;
use thiserror::Error;

use crate::http::HttpClientError;
use crate::sandbox::SandboxError;

use super::expression::ExpressionError;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Structural problems with a definition. Always fatal, never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("workflow has no nodes")]
    Empty,

    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(String),

    #[error("duplicate node name '{0}'")]
    DuplicateNodeName(String),

    #[error("edge '{edge_id}' refers to unknown node '{endpoint}'")]
    UnknownEdgeEndpoint { edge_id: String, endpoint: String },

    #[error("cycle detected involving node '{0}'")]
    CycleDetected(String),

    #[error("node '{node}' references unknown producer in '{reference}'")]
    UnknownReference { node: String, reference: String },

    #[error("node '{node}' references '{producer}', which does not run before it")]
    ReferenceNotUpstream { node: String, producer: String },

    #[error("node '{node}': {message}")]
    InvalidNodeConfig { node: String, message: String },
}

// ---------------------------------------------------------------------------
// Definition loading
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported definition format: {0}")]
    UnsupportedFormat(String),
}

// ---------------------------------------------------------------------------
// Processor errors
// ---------------------------------------------------------------------------

/// Failure of one processor invocation.
#[derive(Debug, Clone, Error)]
pub enum ProcessorError {
    #[error("invalid node configuration: {0}")]
    InvalidConfig(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("{0}")]
    Fatal(String),

    #[error("sandbox security violation: {0}")]
    SecurityViolation(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("node timed out after {0:?}")]
    Timeout(Duration),

    #[error("cancelled")]
    Cancelled,
}

impl ProcessorError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProcessorError::Transient(_) | ProcessorError::Timeout(_) => true,
            ProcessorError::Llm(err) => err.is_transient(),
            ProcessorError::InvalidConfig(_)
            | ProcessorError::Fatal(_)
            | ProcessorError::SecurityViolation(_)
            | ProcessorError::Cancelled => false,
        }
    }
}

impl From<SandboxError> for ProcessorError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::SecurityViolation(msg) => ProcessorError::SecurityViolation(msg),
            SandboxError::Timeout(_) | SandboxError::Unavailable(_) => {
                ProcessorError::Transient(err.to_string())
            }
            SandboxError::OutputTooLarge { .. } | SandboxError::Runtime(_) => {
                ProcessorError::Fatal(err.to_string())
            }
        }
    }
}

impl From<HttpClientError> for ProcessorError {
    fn from(err: HttpClientError) -> Self {
        if err.is_transient() {
            ProcessorError::Transient(err.to_string())
        } else {
            ProcessorError::InvalidConfig(err.to_string())
        }
    }
}

impl From<RepositoryError> for ProcessorError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Connection(_) => ProcessorError::Transient(err.to_string()),
            _ => ProcessorError::Fatal(err.to_string()),
        }
    }
}

impl From<ExpressionError> for ProcessorError {
    fn from(err: ExpressionError) -> Self {
        ProcessorError::Fatal(err.to_string())
    }
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Errors that prevent a run from starting at all.
///
/// Node failures are never reported here; they are data in the result.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("definition error: {0}")]
    Definition(#[from] DefinitionError),

    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("engine is shutting down")]
    ShuttingDown,
}
