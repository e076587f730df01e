//! Application state shared across all route handlers.
//!
//! AppState holds references to the orchestration services. It is passed
//! to handlers via axum's State extractor; all fields use `Arc` for cheap
//! cloning across handler tasks.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use loci_action::ActionExecutor;
use loci_core::config::LociConfig;
use loci_graph::DependencyGraph;
use loci_plan::PlanExecutor;
use loci_workflow::WorkflowEngine;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<Mutex<LociConfig>>,
    /// Action executor (the single point of mutation).
    pub actions: Arc<ActionExecutor>,
    /// Plan executor.
    pub plans: Arc<PlanExecutor>,
    /// Workflow engine.
    pub workflows: Arc<WorkflowEngine>,
    /// Task dependency graph.
    pub graph: Arc<DependencyGraph>,
    /// Bearer token required on protected routes.
    pub api_token: String,
    /// Server start time for uptime calculation.
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        config: LociConfig,
        actions: Arc<ActionExecutor>,
        plans: Arc<PlanExecutor>,
        workflows: Arc<WorkflowEngine>,
        graph: Arc<DependencyGraph>,
        api_token: String,
    ) -> Self {
        Self {
            config: Arc::new(Mutex::new(config)),
            actions,
            plans,
            workflows,
            graph,
            api_token,
            start_time: Instant::now(),
        }
    }
}
