//! Action engine for Loci.
//!
//! The single point of mutation for the whole system: every
//! state-changing operation, whether submitted directly, materialized
//! from a plan step, or dispatched by a workflow, becomes an Action and
//! runs through the executor here, gated by the approval state machine
//! and settled with a captured prior state for rollback.

pub mod error;
pub mod executor;
pub mod rate_limit;
pub mod state_machine;
pub mod task_state;
pub mod types;

pub use error::ActionError;
pub use executor::ActionExecutor;
pub use rate_limit::{CounterStore, MemoryCounterStore, NotificationRateLimiter};
pub use state_machine::validate_transition;
pub use task_state::RepoTaskStates;
pub use types::{ExecutionOutcome, NewAction};
