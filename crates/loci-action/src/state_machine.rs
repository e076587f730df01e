//! Action state machine with validated transitions.
//!
//! Enforces the allowed transitions for the action lifecycle:
//! Pending -> Approved/Rejected, Approved -> Executed/Failed,
//! Executed -> RolledBack.

use loci_core::types::ActionStatus;

use crate::error::ActionError;

/// Validate that a status transition is allowed.
///
/// Valid transitions:
/// - Pending -> Approved (approve)
/// - Pending -> Rejected (reject)
/// - Approved -> Executed (execute success)
/// - Approved -> Failed (execute mutation failure)
/// - Executed -> RolledBack (rollback)
pub fn validate_transition(from: ActionStatus, to: ActionStatus) -> Result<(), ActionError> {
    let valid = matches!(
        (from, to),
        (ActionStatus::Pending, ActionStatus::Approved)
            | (ActionStatus::Pending, ActionStatus::Rejected)
            | (ActionStatus::Approved, ActionStatus::Executed)
            | (ActionStatus::Approved, ActionStatus::Failed)
            | (ActionStatus::Executed, ActionStatus::RolledBack)
    );

    if valid {
        Ok(())
    } else {
        Err(ActionError::StateTransition { from, to })
    }
}
