//! Workflow execution engine for nodeflow.
//!
//! This crate owns the engine proper: graph validation and level planning,
//! `{{producer.field}}` variable resolution, the node processor registry,
//! retrieval augmentation, and the orchestrator that runs a graph to a
//! terminal result. Every external side effect goes through a collaborator
//! trait defined here and implemented in `nodeflow-infra`.

pub mod event;
pub mod http;
pub mod knowledge;
pub mod llm;
pub mod repository;
pub mod sandbox;
pub mod storage;
pub mod workflow;
