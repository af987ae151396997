//! Sandboxed code execution collaborator for CODE nodes.
//!
//! Resource caps (log lines, output length, wall time) are enforced by the
//! implementation, not by the orchestrator.

use std::collections::BTreeMap;

use futures_util::future::BoxFuture;
use nodeflow_types::node::CodeLanguage;
use serde_json::Value;

/// One snippet to run.
#[derive(Debug, Clone, PartialEq)]
pub struct SandboxRequest {
    pub language: CodeLanguage,
    pub code: String,
    /// Resolved inputs, exposed to the snippet as `inputs`.
    pub inputs: BTreeMap<String, Value>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SandboxOutput {
    /// Value the snippet produced (`result` in Python, `return` in JS).
    pub result: Value,
    /// Captured log lines, already capped.
    pub logs: Vec<String>,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum SandboxError {
    #[error("security violation: {0}")]
    SecurityViolation(String),

    #[error("execution timed out after {0}s")]
    Timeout(u64),

    #[error("output exceeds {limit} bytes")]
    OutputTooLarge { limit: usize },

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("sandbox unavailable: {0}")]
    Unavailable(String),
}

pub trait CodeSandbox: Send + Sync {
    fn execute<'a>(
        &'a self,
        request: &'a SandboxRequest,
    ) -> BoxFuture<'a, Result<SandboxOutput, SandboxError>>;
}
