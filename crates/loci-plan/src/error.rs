//! Error types for the plan engine.

use loci_action::ActionError;
use loci_core::error::LociError;
use uuid::Uuid;

/// Errors from plan creation and execution.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Step {step_order} depends on unknown step {dependency}")]
    UnknownDependency { step_order: u32, dependency: u32 },

    #[error("Plan dependencies are cyclic: {0}")]
    CyclicPlan(String),

    #[error("Plan not found: {0}")]
    NotFound(Uuid),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Storage error: {0}")]
    Storage(#[from] LociError),
}
