//! Error types for the action engine.

use loci_core::error::LociError;
use loci_core::types::ActionStatus;
use uuid::Uuid;

/// Errors from action lifecycle management.
///
/// Mutation failures during execute are not errors at this level: they
/// settle the action as `failed` and come back to the caller as a
/// structured `ExecutionOutcome { success: false, .. }`.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Action not found: {0}")]
    NotFound(Uuid),

    #[error("Invalid state transition: {from} -> {to}")]
    StateTransition {
        from: ActionStatus,
        to: ActionStatus,
    },

    #[error("Rollback unavailable: {0}")]
    RollbackUnavailable(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Storage error: {0}")]
    Storage(#[from] LociError),
}
