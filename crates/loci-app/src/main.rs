//! Loci application binary - composition root.
//!
//! Ties together the workspace crates into a single server:
//! 1. Load configuration from TOML
//! 2. Open SQLite storage and run migrations
//! 3. Wire the action executor, plan executor, workflow engine, and
//!    dependency graph (with in-process collaborator implementations)
//! 4. Start the axum REST API
//!
//! Scheduling is deliberately absent here: an external cron collaborator
//! drives `POST /workflows/run-scheduled` and `POST /actions/expire` at
//! its own cadence.

use std::sync::Arc;

use clap::Parser;

use loci_action::{ActionExecutor, MemoryCounterStore, RepoTaskStates};
use loci_api::routes;
use loci_api::state::AppState;
use loci_core::config::LociConfig;
use loci_graph::DependencyGraph;
use loci_plan::{KeywordPlanner, PlanExecutor};
use loci_store::{
    ActionStore, Database, DependencyStore, MemoryNotifier, MemoryTargetRepository, Notifier,
    PlanStore, TargetRepository, WorkflowStore,
};
use loci_workflow::WorkflowEngine;

mod cli;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = cli::CliArgs::parse();

    let log_level = args.log_level.clone().unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    // Configuration: CLI > env > file > defaults.
    let config_path = args.resolve_config_path();
    let mut config = LociConfig::load_or_default(&config_path);
    config.general.port = args.resolve_port(config.general.port);
    let data_dir = args.resolve_data_dir(&config.general.data_dir);

    tracing::info!(
        port = config.general.port,
        data_dir = %data_dir.display(),
        "Starting loci"
    );

    // Storage.
    let db = Arc::new(Database::new(&data_dir.join("loci.db"))?);
    let actions_store = Arc::new(ActionStore::new(Arc::clone(&db)));
    let plans_store = Arc::new(PlanStore::new(Arc::clone(&db)));
    let workflows_store = Arc::new(WorkflowStore::new(Arc::clone(&db)));
    let dependency_store = Arc::new(DependencyStore::new(Arc::clone(&db)));

    // Collaborators: in-process implementations. A real deployment
    // swaps these for the record CRUD service, the integration
    // notifier, and the AI planner.
    let repo: Arc<dyn TargetRepository> = Arc::new(MemoryTargetRepository::new());
    let notifier: Arc<dyn Notifier> = Arc::new(MemoryNotifier::new());

    // Orchestration services.
    let graph = Arc::new(DependencyGraph::new(
        dependency_store,
        Arc::new(RepoTaskStates::new(Arc::clone(&repo))),
    ));
    let action_executor = Arc::new(ActionExecutor::new(
        actions_store,
        Arc::clone(&repo),
        notifier,
        Arc::clone(&graph),
        &config,
        Arc::new(MemoryCounterStore::new()),
    ));
    let plan_executor = Arc::new(PlanExecutor::new(
        plans_store,
        Arc::clone(&action_executor),
        Arc::new(KeywordPlanner::new()),
        &config,
    ));
    let workflow_engine = Arc::new(WorkflowEngine::new(
        workflows_store,
        Arc::clone(&action_executor),
    ));

    // API token.
    let api_token = loci_api::auth::load_or_generate_token(&data_dir.join("api_token"));

    let state = AppState::new(
        config,
        action_executor,
        plan_executor,
        workflow_engine,
        graph,
        api_token,
    );

    routes::serve(state).await?;
    Ok(())
}
