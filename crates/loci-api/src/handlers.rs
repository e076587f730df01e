//! Route handler functions for all API endpoints.
//!
//! Each handler resolves the tenant and acting user from headers,
//! delegates to the orchestration services, and returns JSON.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use loci_action::{ExecutionOutcome, NewAction};
use loci_core::events::ItemEvent;
use loci_core::types::{
    Action, ActionHistoryRecord, ActionStatus, ActionTemplate, ActionType, DependencyKind,
    PlanStatus, StepStatus, TargetType, TaskDependency, Timestamp, Trigger, Workflow,
    WorkflowPatch,
};
use loci_plan::{PlanRunReport, PlannedStep};
use loci_store::ActionFilter;
use loci_workflow::DispatchRecord;

use crate::auth::{tenant_from, user_from};
use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request / response types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateActionRequest {
    pub action_type: ActionType,
    pub target_type: TargetType,
    pub target_id: Option<Uuid>,
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
    pub requires_approval: Option<bool>,
    /// Execute immediately when the action lands auto-approved.
    #[serde(default)]
    pub execute: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApproveRequest {
    /// Chain into execution right after approval.
    #[serde(default)]
    pub execute: bool,
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ListActionsParams {
    pub status: Option<String>,
    pub action_type: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ActionEnvelope {
    pub action: Action,
    pub outcome: Option<ExecutionOutcome>,
}

#[derive(Debug, Deserialize)]
pub struct GeneratePlanRequest {
    pub name: String,
    pub request: String,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub request: String,
    pub steps: Vec<PlannedStep>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlanStatusRequest {
    pub status: PlanStatus,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePlanStepRequest {
    pub status: StepStatus,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListPlansParams {
    pub limit: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PlanIdsResponse {
    pub plan_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreateWorkflowRequest {
    pub name: String,
    pub trigger: Trigger,
    pub actions: Vec<ActionTemplate>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ListWorkflowsParams {
    pub enabled_only: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExecuteWorkflowRequest {
    #[serde(default = "empty_object")]
    pub trigger_data: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct RunScheduledRequest {
    /// Epoch seconds supplied by the external scheduler; defaults to the
    /// server clock when absent.
    pub now: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDependencyRequest {
    pub task_id: Uuid,
    pub depends_on_task_id: Uuid,
    pub kind: DependencyKind,
}

#[derive(Debug, Deserialize)]
pub struct DeleteDependencyRequest {
    pub task_id: Uuid,
    pub depends_on_task_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ExpiredResponse {
    pub expired: Vec<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Action handlers
// =============================================================================

/// POST /actions - create (and optionally execute) an action.
pub async fn create_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateActionRequest>,
) -> Result<Json<ActionEnvelope>, ApiError> {
    let tenant = tenant_from(&headers)?;
    let user = user_from(&headers)?;

    let action = state.actions.create(NewAction {
        tenant_id: tenant,
        user_id: user,
        action_type: body.action_type,
        target_type: body.target_type,
        target_id: body.target_id,
        parameters: body.parameters,
        requires_approval: body.requires_approval,
    })?;

    let outcome = if body.execute && action.status == ActionStatus::Approved {
        Some(state.actions.execute(tenant, action.id, user).await?)
    } else {
        None
    };

    let action = state.actions.get(tenant, action.id)?;
    Ok(Json(ActionEnvelope { action, outcome }))
}

/// GET /actions/{id} - fetch one action.
pub async fn get_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Action>, ApiError> {
    let tenant = tenant_from(&headers)?;
    Ok(Json(state.actions.get(tenant, id)?))
}

/// GET /actions - list actions with optional filters.
pub async fn list_actions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListActionsParams>,
) -> Result<Json<Vec<Action>>, ApiError> {
    let tenant = tenant_from(&headers)?;

    let status = params
        .status
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(ApiError::BadRequest)?;
    let action_type = params
        .action_type
        .as_deref()
        .map(str::parse)
        .transpose()
        .map_err(ApiError::BadRequest)?;

    let filter = ActionFilter {
        status,
        action_type,
        limit: params.limit,
    };
    Ok(Json(state.actions.list(tenant, &filter)?))
}

/// POST /actions/{id}/approve - approve, optionally chaining execution.
pub async fn approve_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<ApproveRequest>,
) -> Result<Json<ActionEnvelope>, ApiError> {
    let tenant = tenant_from(&headers)?;
    let approver = user_from(&headers)?;

    let (action, outcome) = state
        .actions
        .approve(tenant, id, approver, body.execute)
        .await?;
    Ok(Json(ActionEnvelope { action, outcome }))
}

/// POST /actions/{id}/reject - reject a pending action.
pub async fn reject_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<RejectRequest>,
) -> Result<Json<Action>, ApiError> {
    let tenant = tenant_from(&headers)?;
    Ok(Json(state.actions.reject(tenant, id, &body.reason)?))
}

/// POST /actions/{id}/execute - execute an approved action.
pub async fn execute_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<ExecutionOutcome>, ApiError> {
    let tenant = tenant_from(&headers)?;
    let actor = user_from(&headers)?;
    Ok(Json(state.actions.execute(tenant, id, actor).await?))
}

/// POST /actions/{id}/rollback - reverse an executed action.
pub async fn rollback_action(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Action>, ApiError> {
    let tenant = tenant_from(&headers)?;
    Ok(Json(state.actions.rollback(tenant, id).await?))
}

/// GET /actions/{id}/history - audit records for an action.
pub async fn action_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ActionHistoryRecord>>, ApiError> {
    // Tenant scoping: the action must exist within the caller's tenant.
    let tenant = tenant_from(&headers)?;
    state.actions.get(tenant, id)?;
    Ok(Json(state.actions.history(id)?))
}

/// POST /actions/expire - auto-reject stale pending actions.
///
/// Called by the external scheduler on its own cadence.
pub async fn expire_actions(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<ExpiredResponse>, ApiError> {
    let tenant = tenant_from(&headers)?;
    Ok(Json(ExpiredResponse {
        expired: state.actions.expire_stale(tenant)?,
    }))
}

// =============================================================================
// Plan handlers
// =============================================================================

/// POST /plans/generate - decompose a request into a plan.
pub async fn generate_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<GeneratePlanRequest>,
) -> Result<Json<loci_core::types::Plan>, ApiError> {
    let tenant = tenant_from(&headers)?;
    let user = user_from(&headers)?;
    Ok(Json(
        state
            .plans
            .generate(tenant, user, &body.name, &body.request)
            .await?,
    ))
}

/// POST /plans - create a plan from explicit steps.
pub async fn create_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreatePlanRequest>,
) -> Result<Json<loci_core::types::Plan>, ApiError> {
    let tenant = tenant_from(&headers)?;
    let user = user_from(&headers)?;
    Ok(Json(state.plans.create(
        tenant,
        user,
        &body.name,
        body.description,
        &body.request,
        body.steps,
    )?))
}

/// GET /plans/{id} - fetch a plan with its steps.
pub async fn get_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<loci_core::types::Plan>, ApiError> {
    let tenant = tenant_from(&headers)?;
    Ok(Json(state.plans.get(tenant, id)?))
}

/// GET /plans - list plan ids, newest first.
pub async fn list_plans(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListPlansParams>,
) -> Result<Json<PlanIdsResponse>, ApiError> {
    let tenant = tenant_from(&headers)?;
    Ok(Json(PlanIdsResponse {
        plan_ids: state.plans.list_ids(tenant, params.limit)?,
    }))
}

/// POST /plans/{id}/execute - run a plan in dependency order.
pub async fn execute_plan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<PlanRunReport>, ApiError> {
    let tenant = tenant_from(&headers)?;
    let actor = user_from(&headers)?;
    Ok(Json(state.plans.execute(tenant, id, actor).await?))
}

/// PUT /plans/{id}/steps/{order} - set one step's status.
pub async fn update_plan_step(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((id, order)): Path<(Uuid, u32)>,
    Json(body): Json<UpdatePlanStepRequest>,
) -> Result<Json<loci_core::types::Plan>, ApiError> {
    let tenant = tenant_from(&headers)?;
    Ok(Json(state.plans.update_step(
        tenant,
        id,
        order,
        body.status,
        body.error.as_deref(),
    )?))
}

/// PUT /plans/{id}/status - set a plan's status.
pub async fn update_plan_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdatePlanStatusRequest>,
) -> Result<Json<loci_core::types::Plan>, ApiError> {
    let tenant = tenant_from(&headers)?;
    state.plans.update_status(tenant, id, body.status)?;
    Ok(Json(state.plans.get(tenant, id)?))
}

// =============================================================================
// Workflow handlers
// =============================================================================

/// POST /workflows - create an automation rule.
pub async fn create_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateWorkflowRequest>,
) -> Result<Json<Workflow>, ApiError> {
    let tenant = tenant_from(&headers)?;
    let user = user_from(&headers)?;
    Ok(Json(state.workflows.create_workflow(
        tenant,
        user,
        &body.name,
        body.trigger,
        body.actions,
        body.priority,
        body.enabled,
    )?))
}

/// PUT /workflows/{id} - partially update a workflow.
pub async fn update_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(patch): Json<WorkflowPatch>,
) -> Result<Json<Workflow>, ApiError> {
    let tenant = tenant_from(&headers)?;
    Ok(Json(state.workflows.update_workflow(tenant, id, &patch)?))
}

/// DELETE /workflows/{id}.
pub async fn delete_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let tenant = tenant_from(&headers)?;
    state.workflows.delete_workflow(tenant, id)?;
    Ok(Json(DeletedResponse { deleted: true }))
}

/// GET /workflows - list workflows in evaluation order.
pub async fn list_workflows(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListWorkflowsParams>,
) -> Result<Json<Vec<Workflow>>, ApiError> {
    let tenant = tenant_from(&headers)?;
    Ok(Json(
        state
            .workflows
            .list_workflows(tenant, params.enabled_only.unwrap_or(false))?,
    ))
}

/// POST /workflows/{id}/execute - manually run a workflow.
pub async fn execute_workflow(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(body): Json<ExecuteWorkflowRequest>,
) -> Result<Json<Vec<DispatchRecord>>, ApiError> {
    let tenant = tenant_from(&headers)?;
    let actor = user_from(&headers)?;
    Ok(Json(
        state
            .workflows
            .execute_workflow(tenant, id, actor, body.trigger_data)
            .await?,
    ))
}

/// POST /workflows/run-scheduled - scheduler tick.
///
/// The external cron collaborator supplies `now`; due-ness itself is a
/// pure predicate inside the engine.
pub async fn run_scheduled(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RunScheduledRequest>,
) -> Result<Json<Vec<DispatchRecord>>, ApiError> {
    let tenant = tenant_from(&headers)?;
    let now = body.now.map(Timestamp).unwrap_or_else(Timestamp::now);
    Ok(Json(state.workflows.run_scheduled(tenant, now).await?))
}

/// POST /events - item-lifecycle event from the CRUD layer.
pub async fn post_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<ItemEvent>,
) -> Result<Json<Vec<DispatchRecord>>, ApiError> {
    let tenant = tenant_from(&headers)?;
    Ok(Json(state.workflows.evaluate(tenant, &event).await?))
}

// =============================================================================
// Dependency handlers
// =============================================================================

/// POST /dependencies - add a cycle-checked dependency edge.
pub async fn create_dependency(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<CreateDependencyRequest>,
) -> Result<Json<TaskDependency>, ApiError> {
    let tenant = tenant_from(&headers)?;
    Ok(Json(
        state
            .graph
            .add_dependency(tenant, body.task_id, body.depends_on_task_id, body.kind)
            .await?,
    ))
}

/// DELETE /dependencies - remove a dependency edge.
pub async fn delete_dependency(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<DeleteDependencyRequest>,
) -> Result<Json<DeletedResponse>, ApiError> {
    let tenant = tenant_from(&headers)?;
    state
        .graph
        .remove_dependency(tenant, body.task_id, body.depends_on_task_id)
        .await?;
    Ok(Json(DeletedResponse { deleted: true }))
}

// =============================================================================
// Health
// =============================================================================

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}
