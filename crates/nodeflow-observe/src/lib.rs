//! Tracing setup shared by the nodeflow binaries.

pub mod tracing_setup;
