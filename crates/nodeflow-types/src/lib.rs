//! Shared domain types for the nodeflow workflow engine.
//!
//! This crate is pure data: workflow definitions, node payloads, execution
//! results, LLM request/response shapes, and configuration. It performs no
//! I/O and has no async code, so every other crate can depend on it.

pub mod config;
pub mod error;
pub mod event;
pub mod knowledge;
pub mod llm;
pub mod node;
pub mod result;
pub mod storage;
pub mod workflow;
