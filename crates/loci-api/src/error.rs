//! API error types and JSON error response formatting.
//!
//! ApiError provides a consistent JSON error response format across all
//! endpoints, mapping internal errors to appropriate HTTP status codes:
//! validation 400, not-found 404, state/graph conflicts 409, everything
//! unexpected 500.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use loci_action::ActionError;
use loci_core::error::LociError;
use loci_graph::GraphError;
use loci_plan::PlanError;
use loci_workflow::WorkflowError;

/// JSON error response body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g., "bad_request", "not_found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type that maps to HTTP status codes and JSON responses.
#[derive(Debug)]
pub enum ApiError {
    /// 400 Bad Request - missing or invalid parameters.
    BadRequest(String),
    /// 401 Unauthorized - missing or invalid credentials.
    Unauthorized(String),
    /// 404 Not Found - resource does not exist.
    NotFound(String),
    /// 409 Conflict - state conflict (invalid transition, cycle).
    Conflict(String),
    /// 429 Too Many Requests - rate limited.
    TooManyRequests(String),
    /// 500 Internal Server Error - unexpected server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::TooManyRequests(msg) => {
                (StatusCode::TOO_MANY_REQUESTS, "too_many_requests", msg)
            }
            ApiError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        let body = ErrorBody {
            error: error_code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<LociError> for ApiError {
    fn from(err: LociError) -> Self {
        match &err {
            LociError::Validation(msg) => ApiError::BadRequest(msg.clone()),
            LociError::NotFound(msg) => ApiError::NotFound(msg.clone()),
            LociError::RateLimited => ApiError::TooManyRequests(err.to_string()),
            _ => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<ActionError> for ApiError {
    fn from(err: ActionError) -> Self {
        match err {
            ActionError::Validation(msg) => ApiError::BadRequest(msg),
            err @ ActionError::NotFound(_) => ApiError::NotFound(err.to_string()),
            err @ (ActionError::StateTransition { .. } | ActionError::RollbackUnavailable(_)) => {
                ApiError::Conflict(err.to_string())
            }
            err @ ActionError::Execution(_) => ApiError::Internal(err.to_string()),
            ActionError::Storage(inner) => ApiError::from(inner),
        }
    }
}

impl From<PlanError> for ApiError {
    fn from(err: PlanError) -> Self {
        match err {
            err @ (PlanError::Validation(_) | PlanError::UnknownDependency { .. }) => {
                ApiError::BadRequest(err.to_string())
            }
            err @ PlanError::CyclicPlan(_) => ApiError::Conflict(err.to_string()),
            err @ PlanError::NotFound(_) => ApiError::NotFound(err.to_string()),
            PlanError::Action(inner) => ApiError::from(inner),
            PlanError::Storage(inner) => ApiError::from(inner),
        }
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(msg) => ApiError::BadRequest(msg),
            err @ WorkflowError::NotFound(_) => ApiError::NotFound(err.to_string()),
            WorkflowError::Action(inner) => ApiError::from(inner),
            WorkflowError::Storage(inner) => ApiError::from(inner),
        }
    }
}

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        match err {
            err @ GraphError::SelfReference(_) => ApiError::BadRequest(err.to_string()),
            err @ GraphError::CyclicDependency { .. } => ApiError::Conflict(err.to_string()),
            err @ GraphError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            GraphError::Storage(inner) => ApiError::from(inner),
        }
    }
}
