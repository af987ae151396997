//! Infrastructure layer for nodeflow.
//!
//! Concrete implementations of the collaborator traits defined in
//! `nodeflow-core`: an OpenAI-compatible completion provider, a reqwest HTTP
//! client, an HTTP retrieval client, a subprocess code sandbox, a local
//! artifact store, and SQLite persistence. Also loads `config.toml`.

pub mod config;
pub mod http;
pub mod knowledge;
pub mod llm;
pub mod sandbox;
pub mod sqlite;
pub mod storage;
