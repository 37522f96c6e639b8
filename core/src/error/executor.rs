use thiserror::Error;

use super::store::StoreError;

/// Errors surfaced by the execution manager and coordinator.
///
/// Step failures are never reported through this type; they are recorded on
/// the step itself.
#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("runbook '{runbook_id}' is invalid: {}", errors.join("; "))]
    Validation {
        execution_id: String,
        runbook_id: String,
        errors: Vec<String>,
    },

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal engine error: {0}")]
    Internal(String),
}
