//! Errors shared across crate boundaries.

/// Errors from persistence and other storage-backed collaborators.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}
