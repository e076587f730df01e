//! Loci core crate - shared domain types, errors, configuration, events.
//!
//! Every other crate in the workspace depends on this one. It defines the
//! orchestration data model (actions, plans, workflows, dependency edges),
//! the top-level error type, the TOML configuration, and the domain events
//! consumed by the workflow engine.

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::LociConfig;
pub use error::{LociError, Result};
pub use events::ItemEvent;
pub use types::*;
