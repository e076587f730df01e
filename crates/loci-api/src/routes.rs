//! Router setup with all API routes and middleware.
//!
//! Configures the axum Router with CORS, tracing, compression, the
//! per-second request limiter, and bearer-token auth on everything but
//! /health.

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use loci_core::error::LociError;

use crate::handlers;
use crate::rate_limit::RequestLimiter;
use crate::state::AppState;

/// Create the axum Router with all routes and middleware.
pub fn create_router(state: AppState) -> Router {
    // CORS: allow localhost origins for the dashboard.
    let port = state.config.lock().map(|c| c.general.port).unwrap_or(3050);
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list([
            format!("http://127.0.0.1:{}", port)
                .parse::<HeaderValue>()
                .expect("static origin"),
            format!("http://localhost:{}", port)
                .parse::<HeaderValue>()
                .expect("static origin"),
        ]))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            header::ACCEPT,
            header::HeaderName::from_static("x-tenant-id"),
            header::HeaderName::from_static("x-user-id"),
        ]);

    let public_routes = Router::new().route("/health", get(handlers::health));

    // 100 requests per second across the protected surface.
    let limiter = RequestLimiter::new(100);

    let protected_routes = Router::new()
        // Actions
        .route(
            "/actions",
            get(handlers::list_actions).post(handlers::create_action),
        )
        .route("/actions/expire", post(handlers::expire_actions))
        .route("/actions/{id}", get(handlers::get_action))
        .route("/actions/{id}/approve", post(handlers::approve_action))
        .route("/actions/{id}/reject", post(handlers::reject_action))
        .route("/actions/{id}/execute", post(handlers::execute_action))
        .route("/actions/{id}/rollback", post(handlers::rollback_action))
        .route("/actions/{id}/history", get(handlers::action_history))
        // Plans
        .route(
            "/plans",
            get(handlers::list_plans).post(handlers::create_plan),
        )
        .route("/plans/generate", post(handlers::generate_plan))
        .route("/plans/{id}", get(handlers::get_plan))
        .route("/plans/{id}/execute", post(handlers::execute_plan))
        .route("/plans/{id}/status", put(handlers::update_plan_status))
        .route(
            "/plans/{id}/steps/{order}",
            put(handlers::update_plan_step),
        )
        // Workflows
        .route(
            "/workflows",
            get(handlers::list_workflows).post(handlers::create_workflow),
        )
        .route("/workflows/run-scheduled", post(handlers::run_scheduled))
        .route(
            "/workflows/{id}",
            put(handlers::update_workflow).delete(handlers::delete_workflow),
        )
        .route("/workflows/{id}/execute", post(handlers::execute_workflow))
        // Events and dependencies
        .route("/events", post(handlers::post_event))
        .route(
            "/dependencies",
            post(handlers::create_dependency).delete(handlers::delete_dependency),
        )
        .layer(axum::middleware::from_fn(
            crate::rate_limit::rate_limit_middleware,
        ))
        .layer(axum::Extension(limiter))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            crate::auth::require_auth,
        ));

    public_routes
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the configured address.
///
/// Binds to 127.0.0.1 (localhost only) on the port from config.
pub async fn serve(state: AppState) -> Result<(), LociError> {
    let port = state.config.lock().map(|c| c.general.port).unwrap_or(3050);
    let addr = format!("127.0.0.1:{}", port);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("API server listening on http://{}", addr);

    let router = create_router(state);
    axum::serve(listener, router)
        .await
        .map_err(|e| LociError::Storage(format!("Server error: {}", e)))?;
    Ok(())
}
