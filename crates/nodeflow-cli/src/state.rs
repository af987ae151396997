//! Application state wiring the engine to its collaborators.
//!
//! The engine is generic over its repository; `AppState` pins it to SQLite
//! and plugs in the infra implementations the config asks for.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use nodeflow_core::knowledge::box_retriever::BoxKnowledgeRetriever;
use nodeflow_core::workflow::executor::{EngineLimits, WorkflowEngine};
use nodeflow_core::workflow::registry::{ProcessorRegistry, ProcessorServices};
use nodeflow_infra::config::{database_url, output_dir};
use nodeflow_infra::http::ReqwestHttpClient;
use nodeflow_infra::knowledge::HttpKnowledgeRetriever;
use nodeflow_infra::llm::{api_key_from_env, create_provider};
use nodeflow_infra::sandbox::SubprocessSandbox;
use nodeflow_infra::sqlite::execution::SqliteExecutionRepository;
use nodeflow_infra::sqlite::pool::DatabasePool;
use nodeflow_infra::storage::LocalArtifactStore;
use nodeflow_types::config::EngineConfig;

pub type ConcreteEngine = WorkflowEngine<SqliteExecutionRepository>;

/// Shared state for commands that touch persistence.
pub struct AppState {
    pub config: EngineConfig,
    pub data_dir: PathBuf,
    pub repo: SqliteExecutionRepository,
}

impl AppState {
    /// Create the data directory and open the database.
    pub async fn init(config: EngineConfig, data_dir: PathBuf) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(&data_dir)
            .await
            .with_context(|| format!("failed to create {}", data_dir.display()))?;

        let db_url = database_url(&config, &data_dir);
        let pool = DatabasePool::new(&db_url)
            .await
            .with_context(|| format!("failed to open database {db_url}"))?;

        Ok(Self {
            config,
            data_dir,
            repo: SqliteExecutionRepository::new(pool),
        })
    }

    /// Build an engine with every collaborator the config allows.
    ///
    /// A missing API key or retrieval endpoint leaves that collaborator out;
    /// nodes needing it then fail with a configuration error.
    pub fn engine(&self) -> ConcreteEngine {
        let mut services = ProcessorServices::new()
            .with_sandbox(Arc::new(SubprocessSandbox::new(self.config.sandbox.clone())))
            .with_http(Arc::new(ReqwestHttpClient::new()))
            .with_store(Arc::new(LocalArtifactStore::new(output_dir(
                &self.config,
                &self.data_dir,
            ))));

        match create_provider(&self.config.ai, api_key_from_env(&self.config.ai)) {
            Ok(provider) => services = services.with_llm(provider),
            Err(e) => tracing::debug!(
                env = %self.config.ai.api_key_env,
                error = %e,
                "no completion provider configured"
            ),
        }
        if let Some(endpoint) = &self.config.knowledge.endpoint {
            services = services
                .with_retriever(BoxKnowledgeRetriever::new(HttpKnowledgeRetriever::new(endpoint)));
        }

        WorkflowEngine::new(self.repo.clone(), ProcessorRegistry::with_builtins(), services)
            .with_ai_config(self.config.ai.snapshot())
            .with_knowledge_config(self.config.knowledge.snapshot())
            .with_limits(EngineLimits::from_section(&self.config.engine))
    }
}
