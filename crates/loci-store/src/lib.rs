//! Loci storage crate - SQLite persistence for the orchestration core.
//!
//! Provides a WAL-mode SQLite database with migrations, stores for
//! actions, plans, workflows, and task-dependency edges, and the
//! collaborator traits (target repository, notifier) consumed by the
//! action executor, together with in-memory implementations for tests
//! and single-instance deployments.
//!
//! The action store is where the concurrency guard lives: status
//! transitions are compare-and-swap `UPDATE ... WHERE status = ?`
//! statements, so concurrent executes of the same action cannot both
//! claim it.

pub mod action_store;
pub mod db;
pub mod dependency_store;
pub mod migrations;
pub mod plan_store;
pub mod target;
pub mod workflow_store;

pub use action_store::{ActionFilter, ActionStore};
pub use db::Database;
pub use dependency_store::DependencyStore;
pub use plan_store::PlanStore;
pub use target::{
    DeliveredNotification, MemoryNotifier, MemoryTargetRepository, Notifier, ScheduledReminder,
    TargetRepository,
};
pub use workflow_store::WorkflowStore;
