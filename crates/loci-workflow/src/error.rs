//! Error types for the workflow engine.

use loci_action::ActionError;
use loci_core::error::LociError;
use uuid::Uuid;

/// Errors from workflow management and evaluation.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Workflow not found: {0}")]
    NotFound(Uuid),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Storage error: {0}")]
    Storage(#[from] LociError),
}
