//! Workflow engine: trigger matching and action dispatch.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use loci_action::{ActionError, ActionExecutor, ExecutionOutcome, NewAction};
use loci_core::events::ItemEvent;
use loci_core::types::{
    ActionTemplate, ActionType, TargetType, TenantId, Timestamp, Trigger, TriggerType, UserId,
    Workflow, WorkflowPatch,
};
use loci_store::WorkflowStore;

use crate::condition::conditions_match;
use crate::error::WorkflowError;
use crate::schedule::is_due;

/// One action dispatched by a matching workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub workflow_id: Uuid,
    pub action_id: Uuid,
    pub outcome: ExecutionOutcome,
}

/// Matches workflows against events and scheduled ticks.
pub struct WorkflowEngine {
    store: Arc<WorkflowStore>,
    actions: Arc<ActionExecutor>,
}

impl WorkflowEngine {
    pub fn new(store: Arc<WorkflowStore>, actions: Arc<ActionExecutor>) -> Self {
        Self { store, actions }
    }

    /// Validate and persist a workflow definition.
    pub fn create_workflow(
        &self,
        tenant: TenantId,
        created_by: UserId,
        name: &str,
        trigger: Trigger,
        actions: Vec<ActionTemplate>,
        priority: i32,
        enabled: bool,
    ) -> Result<Workflow, WorkflowError> {
        validate_definition(name, &trigger, &actions)?;

        let workflow = Workflow {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            created_by,
            name: name.to_string(),
            trigger,
            actions,
            priority,
            enabled,
            last_run_at: None,
            created_at: Timestamp::now(),
        };
        self.store.insert(&workflow)?;
        tracing::info!(workflow = %workflow.id, name = %workflow.name, "Workflow created");
        Ok(workflow)
    }

    /// Apply a partial update; absent patch fields stay untouched.
    pub fn update_workflow(
        &self,
        tenant: TenantId,
        id: Uuid,
        patch: &WorkflowPatch,
    ) -> Result<Workflow, WorkflowError> {
        // Validate the patched definition before anything is persisted.
        let mut preview = self.get_workflow(tenant, id)?;
        patch.apply_to(&mut preview);
        validate_definition(&preview.name, &preview.trigger, &preview.actions)?;

        self.store
            .update(tenant, id, patch)?
            .ok_or(WorkflowError::NotFound(id))
    }

    pub fn delete_workflow(&self, tenant: TenantId, id: Uuid) -> Result<(), WorkflowError> {
        if !self.store.delete(tenant, id)? {
            return Err(WorkflowError::NotFound(id));
        }
        Ok(())
    }

    pub fn get_workflow(&self, tenant: TenantId, id: Uuid) -> Result<Workflow, WorkflowError> {
        self.store.get(tenant, id)?.ok_or(WorkflowError::NotFound(id))
    }

    pub fn list_workflows(
        &self,
        tenant: TenantId,
        enabled_only: bool,
    ) -> Result<Vec<Workflow>, WorkflowError> {
        Ok(self.store.list(tenant, enabled_only)?)
    }

    /// Evaluate an item-lifecycle event against every enabled workflow.
    ///
    /// Matching workflows run in descending priority (ties by id
    /// ascending) and dispatch each action template as an auto-approved
    /// action targeting the event's item.
    pub async fn evaluate(
        &self,
        tenant: TenantId,
        event: &ItemEvent,
    ) -> Result<Vec<DispatchRecord>, WorkflowError> {
        let workflows = self.store.list(tenant, true)?;
        let mut dispatched = Vec::new();

        for workflow in workflows {
            if workflow.trigger.trigger_type != event.trigger_type() {
                continue;
            }
            if let Some(item_type) = workflow.trigger.item_type {
                if item_type != event.item_type() {
                    continue;
                }
            }
            if event.trigger_type() == TriggerType::StatusChanged && !status_actually_changed(event)
            {
                continue;
            }
            // Conditions are evaluated against the item's new data; a
            // condition on `status` therefore sees the new value.
            if !conditions_match(&workflow.trigger.conditions, event.data()) {
                continue;
            }

            tracing::info!(
                workflow = %workflow.id,
                trigger = %workflow.trigger.trigger_type,
                item = %event.item_id(),
                "Workflow matched"
            );
            let records = self
                .dispatch(
                    tenant,
                    &workflow,
                    workflow.created_by,
                    Some((event.item_type(), event.item_id())),
                )
                .await?;
            self.store.mark_ran(tenant, workflow.id, Timestamp::now())?;
            dispatched.extend(records);
        }
        Ok(dispatched)
    }

    /// Pure predicate: is this scheduled workflow due at `now`?
    pub fn due(&self, workflow: &Workflow, now: Timestamp) -> bool {
        workflow.enabled
            && workflow.trigger.trigger_type == TriggerType::Scheduled
            && workflow
                .trigger
                .schedule
                .as_ref()
                .map(|s| is_due(s, workflow.last_run_at, now))
                .unwrap_or(false)
    }

    /// Run all scheduled workflows due at `now`.
    ///
    /// `now` is supplied by the external scheduler collaborator; this
    /// method never reads the wall clock for due-ness.
    pub async fn run_scheduled(
        &self,
        tenant: TenantId,
        now: Timestamp,
    ) -> Result<Vec<DispatchRecord>, WorkflowError> {
        let workflows = self.store.list(tenant, true)?;
        let mut dispatched = Vec::new();

        for workflow in workflows {
            if !self.due(&workflow, now) {
                continue;
            }
            tracing::info!(workflow = %workflow.id, "Scheduled workflow due");
            let records = self
                .dispatch(tenant, &workflow, workflow.created_by, None)
                .await?;
            self.store.mark_ran(tenant, workflow.id, now)?;
            dispatched.extend(records);
        }
        Ok(dispatched)
    }

    /// Manually run one workflow against caller-supplied trigger data.
    ///
    /// Conditions still apply; a non-matching `trigger_data` dispatches
    /// nothing.
    pub async fn execute_workflow(
        &self,
        tenant: TenantId,
        id: Uuid,
        actor: UserId,
        trigger_data: serde_json::Value,
    ) -> Result<Vec<DispatchRecord>, WorkflowError> {
        let workflow = self.get_workflow(tenant, id)?;
        if !conditions_match(&workflow.trigger.conditions, &trigger_data) {
            return Ok(Vec::new());
        }

        let item = trigger_data
            .get("id")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .and_then(|item_id| workflow.trigger.item_type.map(|t| (t, item_id)));

        let records = self.dispatch(tenant, &workflow, actor, item).await?;
        self.store.mark_ran(tenant, id, Timestamp::now())?;
        Ok(records)
    }

    /// Dispatch a workflow's action templates as auto-approved actions.
    ///
    /// `item` carries the triggering record, used as the default target;
    /// create templates never target an existing record.
    async fn dispatch(
        &self,
        tenant: TenantId,
        workflow: &Workflow,
        user: UserId,
        item: Option<(TargetType, Uuid)>,
    ) -> Result<Vec<DispatchRecord>, WorkflowError> {
        let mut records = Vec::new();
        for template in &workflow.actions {
            let target_type = template
                .target_type
                .or(item.map(|(t, _)| t))
                .or(workflow.trigger.item_type);
            let Some(target_type) = target_type else {
                tracing::warn!(
                    workflow = %workflow.id,
                    "Action template has no resolvable target type; skipping"
                );
                continue;
            };
            let target_id = match template.action_type {
                ActionType::Create => None,
                _ => item.map(|(_, id)| id),
            };

            let input = NewAction {
                tenant_id: tenant,
                user_id: user,
                action_type: template.action_type,
                target_type,
                target_id,
                parameters: template.parameters.clone(),
                // The workflow definition is the standing approval.
                requires_approval: Some(false),
            };
            let action = match self.actions.create(input) {
                Ok(action) => action,
                Err(ActionError::Validation(msg)) => {
                    tracing::warn!(workflow = %workflow.id, error = %msg, "Template action invalid; skipping");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let outcome = self.actions.execute(tenant, action.id, user).await?;
            records.push(DispatchRecord {
                workflow_id: workflow.id,
                action_id: action.id,
                outcome,
            });
        }
        Ok(records)
    }
}

fn status_actually_changed(event: &ItemEvent) -> bool {
    let previous = event.previous().and_then(|p| p.get("status"));
    let current = event.data().get("status");
    previous != current
}

fn validate_definition(
    name: &str,
    trigger: &Trigger,
    actions: &[ActionTemplate],
) -> Result<(), WorkflowError> {
    if name.trim().is_empty() {
        return Err(WorkflowError::Validation(
            "workflow name must not be empty".to_string(),
        ));
    }
    if actions.is_empty() {
        return Err(WorkflowError::Validation(
            "a workflow needs at least one action".to_string(),
        ));
    }
    match trigger.trigger_type {
        TriggerType::Scheduled => {
            if trigger.schedule.is_none() {
                return Err(WorkflowError::Validation(
                    "a scheduled trigger needs a schedule".to_string(),
                ));
            }
            // Without an event there is no item to default to.
            for template in actions {
                if template.target_type.is_none() && trigger.item_type.is_none() {
                    return Err(WorkflowError::Validation(
                        "scheduled action templates must name a target type".to_string(),
                    ));
                }
            }
        }
        _ => {
            if trigger.schedule.is_some() {
                return Err(WorkflowError::Validation(
                    "only scheduled triggers may carry a schedule".to_string(),
                ));
            }
        }
    }
    Ok(())
}
