//! Loci API crate - axum HTTP surface for the orchestration core.
//!
//! Exposes the action, plan, workflow, and dependency operations over
//! REST with bearer-token auth, tenant scoping via the `x-tenant-id`
//! header, and a per-second rate limit.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
