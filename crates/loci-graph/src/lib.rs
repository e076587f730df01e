//! Task dependency graph for Loci.
//!
//! Maintains blocks/blocked_by edges between task records, rejects
//! inserts that would close a cycle, and cascades status changes: when
//! a task completes, tasks it was blocking become workable again.

pub mod error;
pub mod graph;
pub mod reconcile;

pub use error::GraphError;
pub use graph::{DependencyGraph, TaskStateStore};
pub use reconcile::derive_parent_state;
