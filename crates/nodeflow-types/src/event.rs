//! Engine lifecycle events.
//!
//! `EngineEvent` is broadcast on the engine's event bus while runs execute.
//! All variants are Clone + Send + Sync for use with tokio broadcast channels.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::result::{SkipReason, WorkflowStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A run has started.
    RunStarted {
        run_id: Uuid,
        workflow_name: String,
        node_count: usize,
        level_count: usize,
    },

    /// A node attempt has started.
    NodeStarted {
        run_id: Uuid,
        node_id: String,
        node_name: String,
        node_type: String,
        attempt: u32,
    },

    /// A node attempt failed and will be retried after `delay_ms`.
    NodeRetrying {
        run_id: Uuid,
        node_id: String,
        attempt: u32,
        delay_ms: u64,
        error: String,
    },

    /// A node completed successfully.
    NodeCompleted {
        run_id: Uuid,
        node_id: String,
        node_name: String,
        duration_ms: u64,
    },

    /// A node ended in error.
    NodeFailed {
        run_id: Uuid,
        node_id: String,
        node_name: String,
        error: String,
    },

    /// A node was not invoked.
    NodeSkipped {
        run_id: Uuid,
        node_id: String,
        reason: SkipReason,
    },

    /// A run reached a terminal state.
    RunFinished {
        run_id: Uuid,
        status: WorkflowStatus,
        duration_ms: u64,
    },
}

impl EngineEvent {
    pub fn run_id(&self) -> Uuid {
        match self {
            EngineEvent::RunStarted { run_id, .. }
            | EngineEvent::NodeStarted { run_id, .. }
            | EngineEvent::NodeRetrying { run_id, .. }
            | EngineEvent::NodeCompleted { run_id, .. }
            | EngineEvent::NodeFailed { run_id, .. }
            | EngineEvent::NodeSkipped { run_id, .. }
            | EngineEvent::RunFinished { run_id, .. } => *run_id,
        }
    }
}
