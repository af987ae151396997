pub mod aggregator;
pub mod context;
pub mod definition;
pub mod error;
pub mod executor;
pub mod expression;
pub mod graph;
pub mod processors;
pub mod registry;
pub mod retrieval;
pub mod retry;
pub mod template;
