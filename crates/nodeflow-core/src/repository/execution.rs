//! Persistence collaborator trait for definitions and execution records.
//!
//! The engine treats the write methods as side channels: their failures are
//! logged and never change a run's result.

use std::future::Future;

use nodeflow_types::error::RepositoryError;
use nodeflow_types::result::{NodeResult, WorkflowExecutionResult};
use nodeflow_types::workflow::WorkflowDefinition;
use uuid::Uuid;

pub trait ExecutionRepository: Send + Sync {
    /// Load a stored definition by id.
    fn load_definition(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<WorkflowDefinition, RepositoryError>> + Send;

    /// Record one node's result as soon as it is produced.
    fn append_execution_log(
        &self,
        run_id: &Uuid,
        result: &NodeResult,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;

    /// Record the terminal result of a run.
    fn persist_execution_result(
        &self,
        result: &WorkflowExecutionResult,
    ) -> impl Future<Output = Result<(), RepositoryError>> + Send;
}

/// Repository that stores nothing, for embedders without persistence.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRepository;

impl ExecutionRepository for NoopRepository {
    async fn load_definition(&self, _id: &str) -> Result<WorkflowDefinition, RepositoryError> {
        Err(RepositoryError::NotFound)
    }

    async fn append_execution_log(
        &self,
        _run_id: &Uuid,
        _result: &NodeResult,
    ) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn persist_execution_result(
        &self,
        _result: &WorkflowExecutionResult,
    ) -> Result<(), RepositoryError> {
        Ok(())
    }
}
