//! SQLite execution repository implementation.
//!
//! Implements `ExecutionRepository` from `nodeflow-core` using sqlx with split
//! read/write pools. Definitions, node logs and terminal results are stored
//! as JSON blobs next to a few indexed columns for listing.

use chrono::{DateTime, Utc};
use nodeflow_core::repository::execution::ExecutionRepository;
use nodeflow_types::error::RepositoryError;
use nodeflow_types::result::{NodeResult, WorkflowExecutionResult, WorkflowStatus};
use nodeflow_types::workflow::{ExecutionMode, WorkflowDefinition};
use serde::Serialize;
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;

/// One row of the run history, without node detail.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub run_id: Uuid,
    pub status: WorkflowStatus,
    pub mode: ExecutionMode,
    pub error: Option<String>,
    pub total_duration_ms: u64,
    pub total_tokens: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// SQLite-backed implementation of `ExecutionRepository`.
#[derive(Debug, Clone)]
pub struct SqliteExecutionRepository {
    pool: DatabasePool,
}

impl SqliteExecutionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Store a definition under `id`, replacing any previous version.
    pub async fn save_definition(
        &self,
        id: &str,
        def: &WorkflowDefinition,
    ) -> Result<(), RepositoryError> {
        let definition_json = serde_json::to_string(def)
            .map_err(|e| RepositoryError::Query(format!("serialize definition: {e}")))?;
        let now = format_datetime(&Utc::now());

        sqlx::query(
            r#"INSERT INTO workflow_definitions (id, name, definition, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 definition = excluded.definition,
                 updated_at = excluded.updated_at"#,
        )
        .bind(id)
        .bind(&def.name)
        .bind(&definition_json)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_executions(
        &self,
        limit: u32,
    ) -> Result<Vec<ExecutionSummary>, RepositoryError> {
        let rows = sqlx::query(
            r#"SELECT run_id, status, mode, error, total_duration_ms, total_tokens,
                      started_at, completed_at
               FROM workflow_executions
               ORDER BY started_at DESC
               LIMIT ?"#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut summaries = Vec::with_capacity(rows.len());
        for row in &rows {
            let r = SummaryRow::from_row(row).map_err(|e| RepositoryError::Query(e.to_string()))?;
            summaries.push(r.into_summary()?);
        }
        Ok(summaries)
    }

    pub async fn get_execution(
        &self,
        run_id: &Uuid,
    ) -> Result<Option<WorkflowExecutionResult>, RepositoryError> {
        let row = sqlx::query("SELECT result FROM workflow_executions WHERE run_id = ?")
            .bind(run_id.to_string())
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let json: String = row
                    .try_get("result")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                let result = serde_json::from_str(&json)
                    .map_err(|e| RepositoryError::Query(format!("invalid result JSON: {e}")))?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    /// Node logs of a run in the order they were appended.
    pub async fn list_node_logs(&self, run_id: &Uuid) -> Result<Vec<NodeResult>, RepositoryError> {
        let rows = sqlx::query("SELECT record FROM node_execution_logs WHERE run_id = ? ORDER BY id ASC")
            .bind(run_id.to_string())
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        let mut logs = Vec::with_capacity(rows.len());
        for row in &rows {
            let json: String = row
                .try_get("record")
                .map_err(|e| RepositoryError::Query(e.to_string()))?;
            logs.push(
                serde_json::from_str(&json)
                    .map_err(|e| RepositoryError::Query(format!("invalid node log JSON: {e}")))?,
            );
        }
        Ok(logs)
    }
}

// ---------------------------------------------------------------------------
// Internal row types
// ---------------------------------------------------------------------------

struct SummaryRow {
    run_id: String,
    status: String,
    mode: String,
    error: Option<String>,
    total_duration_ms: i64,
    total_tokens: i64,
    started_at: String,
    completed_at: String,
}

impl SummaryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            run_id: row.try_get("run_id")?,
            status: row.try_get("status")?,
            mode: row.try_get("mode")?,
            error: row.try_get("error")?,
            total_duration_ms: row.try_get("total_duration_ms")?,
            total_tokens: row.try_get("total_tokens")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
        })
    }

    fn into_summary(self) -> Result<ExecutionSummary, RepositoryError> {
        let status: WorkflowStatus = self.status.parse().map_err(RepositoryError::Query)?;
        let mode: ExecutionMode =
            serde_json::from_value(serde_json::Value::String(self.mode.clone()))
                .map_err(|_| RepositoryError::Query(format!("invalid run mode: {}", self.mode)))?;

        Ok(ExecutionSummary {
            run_id: parse_uuid(&self.run_id)?,
            status,
            mode,
            error: self.error,
            total_duration_ms: self.total_duration_ms.max(0) as u64,
            total_tokens: self.total_tokens.max(0) as u64,
            started_at: parse_datetime(&self.started_at)?,
            completed_at: parse_datetime(&self.completed_at)?,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

/// Serde name of a unit enum variant.
fn variant_name<T: Serialize>(value: &T) -> Result<String, RepositoryError> {
    serde_json::to_value(value)
        .map_err(|e| RepositoryError::Query(e.to_string()))?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| RepositoryError::Query("expected a string variant".into()))
}

// ---------------------------------------------------------------------------
// ExecutionRepository impl
// ---------------------------------------------------------------------------

impl ExecutionRepository for SqliteExecutionRepository {
    async fn load_definition(&self, id: &str) -> Result<WorkflowDefinition, RepositoryError> {
        let row = sqlx::query("SELECT definition FROM workflow_definitions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?
            .ok_or(RepositoryError::NotFound)?;

        let json: String = row
            .try_get("definition")
            .map_err(|e| RepositoryError::Query(e.to_string()))?;
        serde_json::from_str(&json)
            .map_err(|e| RepositoryError::Query(format!("invalid workflow definition JSON: {e}")))
    }

    async fn append_execution_log(
        &self,
        run_id: &Uuid,
        result: &NodeResult,
    ) -> Result<(), RepositoryError> {
        let record = serde_json::to_string(result)
            .map_err(|e| RepositoryError::Query(format!("serialize node result: {e}")))?;
        let status = variant_name(&result.status)?;

        sqlx::query(
            r#"INSERT INTO node_execution_logs
               (run_id, node_id, node_name, node_type, status, attempts, error,
                duration_ms, record, started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(run_id.to_string())
        .bind(&result.node_id)
        .bind(&result.node_name)
        .bind(result.node_type.as_str())
        .bind(&status)
        .bind(i64::from(result.attempts))
        .bind(&result.error)
        .bind(result.duration_ms as i64)
        .bind(&record)
        .bind(format_datetime(&result.started_at))
        .bind(format_datetime(&result.completed_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn persist_execution_result(
        &self,
        result: &WorkflowExecutionResult,
    ) -> Result<(), RepositoryError> {
        let json = serde_json::to_string(result)
            .map_err(|e| RepositoryError::Query(format!("serialize execution result: {e}")))?;
        let mode = variant_name(&result.mode)?;

        sqlx::query(
            r#"INSERT INTO workflow_executions
               (run_id, status, mode, error, total_duration_ms, total_tokens, result,
                started_at, completed_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
               ON CONFLICT(run_id) DO UPDATE SET
                 status = excluded.status,
                 error = excluded.error,
                 total_duration_ms = excluded.total_duration_ms,
                 total_tokens = excluded.total_tokens,
                 result = excluded.result,
                 completed_at = excluded.completed_at"#,
        )
        .bind(result.run_id.to_string())
        .bind(result.status.as_str())
        .bind(&mode)
        .bind(&result.error)
        .bind(result.total_duration_ms as i64)
        .bind(result.total_tokens as i64)
        .bind(&json)
        .bind(format_datetime(&result.started_at))
        .bind(format_datetime(&result.completed_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }
}
