//! Error taxonomy for engine operations.

use thiserror::Error;

/// Errors surfaced by engine operations.
///
/// `Validation` is raised before any mutation and carries a message the
/// caller may show to the user. `Persistence` means the pipeline failed
/// mid-way; the transaction was rolled back and no partial state is
/// exposed. `Invariant` marks configuration-time inconsistencies
/// (catalog vs. schema) and is never user-facing.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("storage failure: {0}")]
    Persistence(#[source] anyhow::Error),

    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl EngineError {
    pub fn validation(message: impl Into<String>) -> Self {
        EngineError::Validation(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        EngineError::Invariant(message.into())
    }

    // Convenience constructors for the common validation failures.

    pub fn list_not_found(list_id: i64) -> Self {
        Self::validation(format!("list {list_id} not found or not accessible"))
    }

    pub fn task_not_found(task_id: i64) -> Self {
        Self::validation(format!("task {task_id} not found or not accessible"))
    }

    pub fn system_list_missing(kind: &str, user_id: i64) -> Self {
        Self::validation(format!("user {user_id} has no {kind} list"))
    }

    pub fn invalid_transition(task_id: i64, from: &str, to: &str) -> Self {
        Self::validation(format!("task {task_id} cannot go from {from} to {to}"))
    }
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        // Validation errors raised inside a db closure come back as anyhow;
        // unwrap them instead of reclassifying as persistence failures.
        match err.downcast::<EngineError>() {
            Ok(engine_err) => engine_err,
            Err(err) => EngineError::Persistence(err),
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(err: rusqlite::Error) -> Self {
        EngineError::Persistence(err.into())
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
