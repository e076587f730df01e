//! Workflow engine for Loci.
//!
//! Matches declarative trigger+condition rules against item-lifecycle
//! events or scheduled ticks and dispatches their action templates
//! through the action executor. The engine itself never reads the wall
//! clock: scheduled evaluation is a pure predicate over a supplied
//! `now`, driven by an external scheduler.

pub mod condition;
pub mod engine;
pub mod error;
pub mod schedule;

pub use condition::{conditions_match, evaluate_condition};
pub use engine::{DispatchRecord, WorkflowEngine};
pub use error::WorkflowError;
pub use schedule::is_due;
