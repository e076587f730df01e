//! Error types for the dependency graph.

use loci_core::error::LociError;
use uuid::Uuid;

/// Errors from dependency graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("A task cannot depend on itself: {0}")]
    SelfReference(Uuid),

    #[error("Dependency would create a cycle: {task_id} -> {depends_on_task_id}")]
    CyclicDependency {
        task_id: Uuid,
        depends_on_task_id: Uuid,
    },

    #[error("Dependency not found: {task_id} -> {depends_on_task_id}")]
    NotFound {
        task_id: Uuid,
        depends_on_task_id: Uuid,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] LociError),
}
