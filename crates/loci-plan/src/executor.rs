//! Plan executor: validation, generation, and dependency-ordered runs.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use loci_action::{ActionError, ActionExecutor, NewAction};
use loci_core::config::LociConfig;
use loci_core::types::{
    ActionType, Plan, PlanStatus, PlanStep, StepStatus, TargetType, TenantId, Timestamp, UserId,
};
use loci_resilience::{retry, with_timeout, Budgets, OutboundError, RetryPolicy};
use loci_store::PlanStore;

use crate::error::PlanError;
use crate::planner::{PlannedStep, Planner};
use crate::topo::topological_order;

/// Per-step outcome of a plan run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_order: u32,
    pub status: StepStatus,
    pub error: Option<String>,
}

/// Result of a plan run, with per-step results preserved for inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanRunReport {
    pub plan_id: Uuid,
    pub status: PlanStatus,
    pub executed_steps: Vec<StepResult>,
    pub errors: Vec<String>,
}

/// Validates, generates, and executes plans.
pub struct PlanExecutor {
    plans: Arc<PlanStore>,
    actions: Arc<ActionExecutor>,
    planner: Arc<dyn Planner>,
    retry_policy: RetryPolicy,
    budgets: Budgets,
}

impl PlanExecutor {
    pub fn new(
        plans: Arc<PlanStore>,
        actions: Arc<ActionExecutor>,
        planner: Arc<dyn Planner>,
        config: &LociConfig,
    ) -> Self {
        Self {
            plans,
            actions,
            planner,
            retry_policy: RetryPolicy::from(&config.retry),
            budgets: Budgets::from(&config.timeouts),
        }
    }

    /// Decompose a request through the planner and persist the resulting
    /// plan.
    ///
    /// The planner call runs under the AI timeout budget with
    /// transient-error retry. Whatever goes wrong (transport failure,
    /// empty decomposition, an invalid step graph), the caller still
    /// receives a valid plan: a single degenerate notify step carrying
    /// the request.
    pub async fn generate(
        &self,
        tenant: TenantId,
        user: UserId,
        name: &str,
        request: &str,
    ) -> Result<Plan, PlanError> {
        let budget = self.budgets.ai_call;
        let decomposed = retry(&self.retry_policy, || {
            let planner = Arc::clone(&self.planner);
            let request = request.to_string();
            async move {
                with_timeout(budget, async move { planner.decompose(&request).await })
                    .await
                    .map_err(OutboundError::from)?
            }
        })
        .await;

        let steps = match decomposed {
            Ok(steps) if !steps.is_empty() => steps,
            Ok(_) => {
                tracing::warn!("Planner returned no steps; using notify fallback");
                vec![fallback_step(request)]
            }
            Err(e) => {
                tracing::warn!(error = %e, "Planner call failed; using notify fallback");
                vec![fallback_step(request)]
            }
        };

        match self.create(tenant, user, name, None, request, steps) {
            Ok(plan) => Ok(plan),
            Err(
                e @ (PlanError::Validation(_)
                | PlanError::UnknownDependency { .. }
                | PlanError::CyclicPlan(_)),
            ) => {
                tracing::warn!(error = %e, "Planner produced an invalid step graph; using notify fallback");
                self.create(tenant, user, name, None, request, vec![fallback_step(request)])
            }
            Err(e) => Err(e),
        }
    }

    /// Validate and persist a plan.
    pub fn create(
        &self,
        tenant: TenantId,
        user: UserId,
        name: &str,
        description: Option<String>,
        request: &str,
        steps: Vec<PlannedStep>,
    ) -> Result<Plan, PlanError> {
        if name.trim().is_empty() {
            return Err(PlanError::Validation("plan name must not be empty".to_string()));
        }
        if steps.is_empty() {
            return Err(PlanError::Validation("a plan needs at least one step".to_string()));
        }
        topological_order(&steps)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            user_id: user,
            name: name.to_string(),
            description,
            request: request.to_string(),
            steps: steps
                .into_iter()
                .map(|s| PlanStep {
                    step_order: s.step_order,
                    action_type: s.action_type,
                    target_type: s.target_type,
                    target_id: s.target_id,
                    action_params: s.action_params,
                    dependencies: s.dependencies,
                    description: s.description,
                    status: StepStatus::Pending,
                    error: None,
                })
                .collect(),
            status: PlanStatus::Pending,
            created_at: Timestamp::now(),
        };
        self.plans.insert(&plan)?;
        tracing::info!(plan = %plan.id, steps = plan.steps.len(), "Plan created");
        Ok(plan)
    }

    pub fn get(&self, tenant: TenantId, id: Uuid) -> Result<Plan, PlanError> {
        self.plans.get(tenant, id)?.ok_or(PlanError::NotFound(id))
    }

    pub fn list_ids(&self, tenant: TenantId, limit: Option<u32>) -> Result<Vec<Uuid>, PlanError> {
        Ok(self.plans.list_ids(tenant, limit)?)
    }

    pub fn update_status(
        &self,
        tenant: TenantId,
        id: Uuid,
        status: PlanStatus,
    ) -> Result<(), PlanError> {
        if !self.plans.update_status(tenant, id, status)? {
            return Err(PlanError::NotFound(id));
        }
        Ok(())
    }

    /// Manually set one step's status (e.g., marking a step completed
    /// after resolving it out of band). Returns the updated plan.
    pub fn update_step(
        &self,
        tenant: TenantId,
        id: Uuid,
        step_order: u32,
        status: StepStatus,
        error: Option<&str>,
    ) -> Result<Plan, PlanError> {
        // Scope the write to the caller's tenant.
        self.get(tenant, id)?;
        if !self.plans.update_step(id, step_order, status, error)? {
            return Err(PlanError::Validation(format!(
                "plan has no step {}",
                step_order
            )));
        }
        self.get(tenant, id)
    }

    /// Run a plan to completion in dependency order.
    ///
    /// Steps are materialized as auto-approved actions (the plan itself
    /// was the approval). A step whose dependency failed is skipped; the
    /// rest of the graph proceeds so independent branches complete. The
    /// plan ends `completed` only if every step completed.
    pub async fn execute(
        &self,
        tenant: TenantId,
        id: Uuid,
        actor: UserId,
    ) -> Result<PlanRunReport, PlanError> {
        let plan = self.get(tenant, id)?;

        let planned: Vec<PlannedStep> = plan
            .steps
            .iter()
            .map(|s| PlannedStep {
                step_order: s.step_order,
                action_type: s.action_type,
                target_type: s.target_type,
                target_id: s.target_id,
                action_params: s.action_params.clone(),
                dependencies: s.dependencies.clone(),
                description: s.description.clone(),
            })
            .collect();
        let order = topological_order(&planned)?;

        self.plans.update_status(tenant, id, PlanStatus::Running)?;
        tracing::info!(plan = %id, "Plan execution started");

        let by_order: HashMap<u32, &PlanStep> =
            plan.steps.iter().map(|s| (s.step_order, s)).collect();
        let mut statuses: HashMap<u32, StepStatus> = plan
            .steps
            .iter()
            .map(|s| (s.step_order, s.status))
            .collect();
        let mut results = Vec::with_capacity(plan.steps.len());
        let mut errors = Vec::new();

        for step_order in order {
            let step = by_order[&step_order];

            // Completed steps from a previous run stay settled.
            if statuses[&step_order] == StepStatus::Completed {
                results.push(StepResult {
                    step_order,
                    status: StepStatus::Completed,
                    error: None,
                });
                continue;
            }

            let blocked = step.dependencies.iter().any(|dep| {
                matches!(
                    statuses.get(dep),
                    Some(StepStatus::Failed) | Some(StepStatus::Skipped)
                )
            });
            if blocked {
                self.plans
                    .update_step(id, step_order, StepStatus::Skipped, None)?;
                statuses.insert(step_order, StepStatus::Skipped);
                results.push(StepResult {
                    step_order,
                    status: StepStatus::Skipped,
                    error: None,
                });
                continue;
            }

            self.plans
                .update_step(id, step_order, StepStatus::Running, None)?;
            let failure = match self.run_step(&plan, step, actor).await {
                Ok(outcome) if outcome.success => None,
                Ok(outcome) => {
                    Some(outcome.error.unwrap_or_else(|| "execution failed".to_string()))
                }
                // A step that cannot even be materialized fails the step,
                // not the whole run.
                Err(PlanError::Action(ActionError::Validation(msg))) => Some(msg),
                Err(e) => return Err(e),
            };

            match failure {
                None => {
                    self.plans
                        .update_step(id, step_order, StepStatus::Completed, None)?;
                    statuses.insert(step_order, StepStatus::Completed);
                    results.push(StepResult {
                        step_order,
                        status: StepStatus::Completed,
                        error: None,
                    });
                }
                Some(message) => {
                    self.plans
                        .update_step(id, step_order, StepStatus::Failed, Some(&message))?;
                    statuses.insert(step_order, StepStatus::Failed);
                    errors.push(format!("step {}: {}", step_order, message));
                    results.push(StepResult {
                        step_order,
                        status: StepStatus::Failed,
                        error: Some(message),
                    });
                }
            }
        }

        let status = if statuses.values().all(|s| *s == StepStatus::Completed) {
            PlanStatus::Completed
        } else {
            PlanStatus::Failed
        };
        self.plans.update_status(tenant, id, status)?;
        tracing::info!(plan = %id, status = %status, errors = errors.len(), "Plan execution finished");

        Ok(PlanRunReport {
            plan_id: id,
            status,
            executed_steps: results,
            errors,
        })
    }

    async fn run_step(
        &self,
        plan: &Plan,
        step: &PlanStep,
        actor: UserId,
    ) -> Result<loci_action::ExecutionOutcome, PlanError> {
        let input = NewAction {
            tenant_id: plan.tenant_id,
            user_id: plan.user_id,
            action_type: step.action_type,
            target_type: step.target_type,
            target_id: step.target_id,
            parameters: step.action_params.clone(),
            // The plan run is the approval.
            requires_approval: Some(false),
        };
        let action = self.actions.create(input)?;
        Ok(self.actions.execute(plan.tenant_id, action.id, actor).await?)
    }
}

fn fallback_step(request: &str) -> PlannedStep {
    PlannedStep {
        step_order: 1,
        action_type: ActionType::Notify,
        target_type: TargetType::Admin,
        target_id: None,
        action_params: serde_json::json!({
            "message": format!("Could not plan request automatically, review it manually: {}", request),
        }),
        dependencies: vec![],
        description: "notify the user to handle the request manually".to_string(),
    }
}
