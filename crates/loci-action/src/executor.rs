//! Action executor: the single point of mutation.
//!
//! Drives the approval state machine, captures prior state for rollback,
//! dispatches by action type to the target repository or notifier, and
//! cascades admin status changes through the dependency graph.
//!
//! Concurrency: the execute idempotence guard is the store's CAS claim on
//! `executed_at`. Whichever request wins the claim performs the mutation
//! exactly once; losers return the recorded outcome.

use std::sync::Arc;

use uuid::Uuid;

use loci_core::config::LociConfig;
use loci_core::types::{
    Action, ActionHistoryRecord, ActionStatus, ActionType, TargetType, TaskState, TenantId,
    Timestamp, UserId,
};
use loci_graph::DependencyGraph;
use loci_resilience::{retry, with_timeout, Budgets, OutboundError, RetryPolicy};
use loci_store::{ActionFilter, ActionStore, Notifier, TargetRepository};

use crate::error::ActionError;
use crate::rate_limit::{CounterStore, NotificationRateLimiter};
use crate::state_machine::validate_transition;
use crate::types::{ExecutionOutcome, NewAction};

/// State machine and dispatcher for gated mutations.
pub struct ActionExecutor {
    actions: Arc<ActionStore>,
    repo: Arc<dyn TargetRepository>,
    notifier: Arc<dyn Notifier>,
    graph: Arc<DependencyGraph>,
    limiter: NotificationRateLimiter,
    retry_policy: RetryPolicy,
    budgets: Budgets,
    auto_approve: loci_core::config::AutoApproveConfig,
    pending_ttl_days: u32,
}

impl ActionExecutor {
    pub fn new(
        actions: Arc<ActionStore>,
        repo: Arc<dyn TargetRepository>,
        notifier: Arc<dyn Notifier>,
        graph: Arc<DependencyGraph>,
        config: &LociConfig,
        counters: Arc<dyn CounterStore>,
    ) -> Self {
        Self {
            actions,
            repo,
            notifier,
            graph,
            limiter: NotificationRateLimiter::new(
                config.approval.max_notifications_per_minute,
                counters,
            ),
            retry_policy: RetryPolicy::from(&config.retry),
            budgets: Budgets::from(&config.timeouts),
            auto_approve: config.approval.auto_approve.clone(),
            pending_ttl_days: config.approval.pending_ttl_days,
        }
    }

    /// Create an action, auto-approving it when approval is not required.
    pub fn create(&self, input: NewAction) -> Result<Action, ActionError> {
        self.validate(&input)?;

        let requires_approval = input
            .requires_approval
            .unwrap_or_else(|| !self.auto_approved_by_policy(input.action_type));

        let action = Action {
            id: Uuid::new_v4(),
            tenant_id: input.tenant_id,
            user_id: input.user_id,
            action_type: input.action_type,
            target_type: input.target_type,
            target_id: input.target_id,
            parameters: input.parameters,
            requires_approval,
            status: if requires_approval {
                ActionStatus::Pending
            } else {
                ActionStatus::Approved
            },
            approved_by: None,
            approved_at: None,
            executed_at: None,
            rolled_back_at: None,
            prior_state: None,
            result: None,
            error: None,
            created_at: Timestamp::now(),
        };
        self.actions.insert(&action)?;
        tracing::info!(
            action = %action.id,
            action_type = %action.action_type,
            target_type = %action.target_type,
            status = %action.status,
            "Action created"
        );
        Ok(action)
    }

    /// Approve a pending action, optionally chaining into execution.
    pub async fn approve(
        &self,
        tenant: TenantId,
        id: Uuid,
        approver: UserId,
        execute_now: bool,
    ) -> Result<(Action, Option<ExecutionOutcome>), ActionError> {
        if !self.actions.approve(tenant, id, approver, Timestamp::now())? {
            let current = self.load(tenant, id)?;
            // Produce the canonical transition error for the observed state.
            validate_transition(current.status, ActionStatus::Approved)?;
            return Err(ActionError::StateTransition {
                from: current.status,
                to: ActionStatus::Approved,
            });
        }

        let outcome = if execute_now {
            Some(self.execute(tenant, id, approver).await?)
        } else {
            None
        };
        Ok((self.load(tenant, id)?, outcome))
    }

    /// Reject a pending action with a reason.
    pub fn reject(&self, tenant: TenantId, id: Uuid, reason: &str) -> Result<Action, ActionError> {
        if !self.actions.reject(tenant, id, reason)? {
            let current = self.load(tenant, id)?;
            validate_transition(current.status, ActionStatus::Rejected)?;
            return Err(ActionError::StateTransition {
                from: current.status,
                to: ActionStatus::Rejected,
            });
        }
        self.load(tenant, id)
    }

    /// Execute an approved action.
    ///
    /// Re-invoking on an already settled action is a no-op returning the
    /// recorded outcome; the target is mutated exactly once. Executing an
    /// unapproved action is a state transition error.
    pub async fn execute(
        &self,
        tenant: TenantId,
        id: Uuid,
        actor: UserId,
    ) -> Result<ExecutionOutcome, ActionError> {
        let action = self.load(tenant, id)?;

        match action.status {
            ActionStatus::Approved => {}
            ActionStatus::Executed | ActionStatus::Failed | ActionStatus::RolledBack => {
                return Ok(recorded_outcome(&action));
            }
            other => {
                validate_transition(other, ActionStatus::Executed)?;
                unreachable!("pending/rejected transitions to executed are invalid");
            }
        }

        if !self.actions.claim_execution(tenant, id, Timestamp::now())? {
            // A concurrent request holds or held the claim.
            return Ok(recorded_outcome(&self.load(tenant, id)?));
        }

        tracing::info!(action = %id, actor = %actor, "Executing action");
        match self.dispatch(&action).await {
            Ok((prior_state, result)) => {
                self.actions
                    .record_result(tenant, id, prior_state.as_ref(), &result)?;
                self.append_history(&action, "executed", None)?;
                self.cascade_if_status_update(&action).await;
                Ok(ExecutionOutcome::succeeded(result))
            }
            Err(message) => {
                self.actions.record_failure(tenant, id, &message)?;
                self.append_history(&action, "failed", Some(&message))?;
                tracing::warn!(action = %id, error = %message, "Action execution failed");
                Ok(ExecutionOutcome::failed(message))
            }
        }
    }

    /// Reverse an executed action using its captured prior state.
    pub async fn rollback(&self, tenant: TenantId, id: Uuid) -> Result<Action, ActionError> {
        let action = self.load(tenant, id)?;

        match action.status {
            ActionStatus::Executed => {}
            ActionStatus::RolledBack => {
                return Err(ActionError::RollbackUnavailable(
                    "action already rolled back".to_string(),
                ));
            }
            ActionStatus::Failed => {
                return Err(ActionError::RollbackUnavailable(
                    "no prior state was captured for a failed action".to_string(),
                ));
            }
            other => {
                return Err(ActionError::StateTransition {
                    from: other,
                    to: ActionStatus::RolledBack,
                });
            }
        }

        let prior_state = action.prior_state.clone().ok_or_else(|| {
            ActionError::RollbackUnavailable("no prior state was captured".to_string())
        })?;

        self.reverse(&action, prior_state).await?;

        if !self.actions.mark_rolled_back(tenant, id, Timestamp::now())? {
            return Err(ActionError::RollbackUnavailable(
                "action already rolled back".to_string(),
            ));
        }
        self.append_history(&action, "rolled_back", None)?;
        tracing::info!(action = %id, "Action rolled back");
        self.load(tenant, id)
    }

    /// List actions with optional status/type filters.
    pub fn list(&self, tenant: TenantId, filter: &ActionFilter) -> Result<Vec<Action>, ActionError> {
        Ok(self.actions.list(tenant, filter)?)
    }

    /// Fetch a single action.
    pub fn get(&self, tenant: TenantId, id: Uuid) -> Result<Action, ActionError> {
        self.load(tenant, id)
    }

    /// Audit history for an action, newest first.
    pub fn history(&self, action_id: Uuid) -> Result<Vec<ActionHistoryRecord>, ActionError> {
        Ok(self.actions.history(action_id)?)
    }

    /// Auto-reject pending actions older than the approval TTL.
    pub fn expire_stale(&self, tenant: TenantId) -> Result<Vec<Uuid>, ActionError> {
        let cutoff = Timestamp(Timestamp::now().0 - self.pending_ttl_days as i64 * 86400);
        let mut expired = Vec::new();
        for id in self.actions.stale_pending(tenant, cutoff)? {
            // CAS: a concurrently approved action stays approved.
            if self.actions.reject(tenant, id, "approval window expired")? {
                expired.push(id);
            }
        }
        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired stale pending actions");
        }
        Ok(expired)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn load(&self, tenant: TenantId, id: Uuid) -> Result<Action, ActionError> {
        self.actions
            .get(tenant, id)?
            .ok_or(ActionError::NotFound(id))
    }

    fn auto_approved_by_policy(&self, action_type: ActionType) -> bool {
        match action_type {
            ActionType::Create => self.auto_approve.create,
            ActionType::Update => self.auto_approve.update,
            ActionType::Delete => self.auto_approve.delete,
            ActionType::Link => self.auto_approve.link,
            ActionType::Notify => self.auto_approve.notify,
            ActionType::Schedule => self.auto_approve.schedule,
        }
    }

    fn validate(&self, input: &NewAction) -> Result<(), ActionError> {
        match input.action_type {
            ActionType::Create => {
                if !input.parameters.is_object() {
                    return Err(ActionError::Validation(
                        "create parameters must be a JSON object".to_string(),
                    ));
                }
            }
            ActionType::Update => {
                require_target(input)?;
                if !input.parameters.is_object() {
                    return Err(ActionError::Validation(
                        "update parameters must be a JSON object".to_string(),
                    ));
                }
            }
            ActionType::Delete => {
                require_target(input)?;
            }
            ActionType::Link => {
                require_target(input)?;
                link_params(&input.parameters).map_err(ActionError::Validation)?;
            }
            ActionType::Notify => {
                message_param(&input.parameters).map_err(ActionError::Validation)?;
            }
            ActionType::Schedule => {
                message_param(&input.parameters).map_err(ActionError::Validation)?;
                schedule_at_param(&input.parameters).map_err(ActionError::Validation)?;
            }
        }
        Ok(())
    }

    /// Perform the target mutation. Returns (prior_state, result) on
    /// success, or a failure message that settles the action as failed.
    async fn dispatch(
        &self,
        action: &Action,
    ) -> Result<(Option<serde_json::Value>, serde_json::Value), String> {
        let tenant = action.tenant_id;
        match action.action_type {
            ActionType::Create => {
                let created = self
                    .repo
                    .create(tenant, action.target_type, action.parameters.clone())
                    .await
                    .map_err(|e| e.to_string())?;
                // No prior record exists; the empty snapshot marks the
                // action rollback-eligible (rollback deletes the record).
                Ok((Some(serde_json::json!({})), created))
            }
            ActionType::Update => {
                let target_id = action.target_id.ok_or("update requires a target id")?;
                let prior = self
                    .repo
                    .get(tenant, action.target_type, target_id)
                    .await
                    .map_err(|e| e.to_string())?
                    .ok_or_else(|| format!("target {}:{} not found", action.target_type, target_id))?;
                let updated = self
                    .repo
                    .update(tenant, action.target_type, target_id, action.parameters.clone())
                    .await
                    .map_err(|e| e.to_string())?;
                Ok((Some(prior), updated))
            }
            ActionType::Delete => {
                let target_id = action.target_id.ok_or("delete requires a target id")?;
                let prior = self
                    .repo
                    .get(tenant, action.target_type, target_id)
                    .await
                    .map_err(|e| e.to_string())?
                    .ok_or_else(|| format!("target {}:{} not found", action.target_type, target_id))?;
                self.repo
                    .delete(tenant, action.target_type, target_id)
                    .await
                    .map_err(|e| e.to_string())?;
                let result = serde_json::json!({"deleted": target_id.to_string()});
                Ok((Some(prior), result))
            }
            ActionType::Link => {
                let target_id = action.target_id.ok_or("link requires a target id")?;
                let (to_type, to_id) = link_params(&action.parameters)?;
                self.repo
                    .link(tenant, action.target_type, target_id, to_type, to_id)
                    .await
                    .map_err(|e| e.to_string())?;
                let result = serde_json::json!({
                    "from_type": action.target_type.to_string(),
                    "from_id": target_id.to_string(),
                    "to_type": to_type.to_string(),
                    "to_id": to_id.to_string(),
                });
                Ok((Some(serde_json::json!({})), result))
            }
            ActionType::Notify => {
                match self.limiter.allow(tenant) {
                    Ok(true) => {}
                    Ok(false) => return Err("notification rate limit exceeded".to_string()),
                    Err(e) => return Err(e.to_string()),
                }
                let message = message_param(&action.parameters)?;
                let id = self
                    .deliver_notification(tenant, action.user_id, &message)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok((
                    Some(serde_json::json!({})),
                    serde_json::json!({"notification_id": id.to_string()}),
                ))
            }
            ActionType::Schedule => {
                let message = message_param(&action.parameters)?;
                let at = schedule_at_param(&action.parameters)?;
                let id = self
                    .schedule_reminder(tenant, action.user_id, &message, at)
                    .await
                    .map_err(|e| e.to_string())?;
                Ok((
                    Some(serde_json::json!({})),
                    serde_json::json!({"reminder_id": id.to_string(), "at": at.0}),
                ))
            }
        }
    }

    /// Outbound notification delivery under retry + integration timeout.
    async fn deliver_notification(
        &self,
        tenant: TenantId,
        user: UserId,
        message: &str,
    ) -> Result<Uuid, OutboundError> {
        let budget = self.budgets.integration;
        retry(&self.retry_policy, || {
            let notifier = Arc::clone(&self.notifier);
            let message = message.to_string();
            async move {
                with_timeout(budget, async move { notifier.notify(tenant, user, &message).await })
                    .await
                    .map_err(OutboundError::from)?
            }
        })
        .await
    }

    /// Outbound reminder scheduling under retry + integration timeout.
    async fn schedule_reminder(
        &self,
        tenant: TenantId,
        user: UserId,
        message: &str,
        at: Timestamp,
    ) -> Result<Uuid, OutboundError> {
        let budget = self.budgets.integration;
        retry(&self.retry_policy, || {
            let notifier = Arc::clone(&self.notifier);
            let message = message.to_string();
            async move {
                with_timeout(budget, async move {
                    notifier.schedule_reminder(tenant, user, &message, at).await
                })
                .await
                .map_err(OutboundError::from)?
            }
        })
        .await
    }

    /// After a successful admin status update, cascade through the graph.
    async fn cascade_if_status_update(&self, action: &Action) {
        if action.action_type != ActionType::Update || action.target_type != TargetType::Admin {
            return;
        }
        let Some(target_id) = action.target_id else { return };
        let Some(new_state) = action
            .parameters
            .get("status")
            .and_then(|s| s.as_str())
            .and_then(|s| s.parse::<TaskState>().ok())
        else {
            return;
        };

        match self
            .graph
            .on_status_changed(action.tenant_id, target_id, new_state)
            .await
        {
            Ok(unblocked) if !unblocked.is_empty() => {
                tracing::info!(task = %target_id, count = unblocked.len(), "Cascade unblocked tasks");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(task = %target_id, error = %e, "Status cascade failed");
            }
        }
    }

    /// Best-effort inverse of an executed action.
    async fn reverse(
        &self,
        action: &Action,
        prior_state: serde_json::Value,
    ) -> Result<(), ActionError> {
        let tenant = action.tenant_id;
        match action.action_type {
            ActionType::Update => {
                let target_id = action
                    .target_id
                    .ok_or_else(|| ActionError::Execution("update has no target id".to_string()))?;
                self.repo
                    .update(tenant, action.target_type, target_id, prior_state)
                    .await
                    .map_err(|e| ActionError::Execution(e.to_string()))?;
            }
            ActionType::Delete => {
                let target_id = action
                    .target_id
                    .ok_or_else(|| ActionError::Execution("delete has no target id".to_string()))?;
                // Restore under the original id.
                self.repo
                    .restore(tenant, action.target_type, target_id, prior_state)
                    .await
                    .map_err(|e| ActionError::Execution(e.to_string()))?;
            }
            ActionType::Create => {
                let created_id = action
                    .result
                    .as_ref()
                    .and_then(|r| r.get("id"))
                    .and_then(|v| v.as_str())
                    .and_then(|s| Uuid::parse_str(s).ok())
                    .ok_or_else(|| {
                        ActionError::Execution("created record id is missing".to_string())
                    })?;
                self.repo
                    .delete(tenant, action.target_type, created_id)
                    .await
                    .map_err(|e| ActionError::Execution(e.to_string()))?;
            }
            ActionType::Link => {
                let target_id = action
                    .target_id
                    .ok_or_else(|| ActionError::Execution("link has no target id".to_string()))?;
                let (to_type, to_id) =
                    link_params(&action.parameters).map_err(ActionError::Execution)?;
                self.repo
                    .unlink(tenant, action.target_type, target_id, to_type, to_id)
                    .await
                    .map_err(|e| ActionError::Execution(e.to_string()))?;
            }
            ActionType::Notify => {
                let id = result_uuid(action, "notification_id")?;
                with_timeout(self.budgets.integration, async {
                    self.notifier.void_notification(tenant, id).await
                })
                .await
                .map_err(|e| ActionError::Execution(e.to_string()))?
                .map_err(|e| ActionError::Execution(e.to_string()))?;
            }
            ActionType::Schedule => {
                let id = result_uuid(action, "reminder_id")?;
                with_timeout(self.budgets.integration, async {
                    self.notifier.cancel_reminder(tenant, id).await
                })
                .await
                .map_err(|e| ActionError::Execution(e.to_string()))?
                .map_err(|e| ActionError::Execution(e.to_string()))?;
            }
        }
        Ok(())
    }

    fn append_history(
        &self,
        action: &Action,
        outcome: &str,
        error: Option<&str>,
    ) -> Result<(), ActionError> {
        self.actions.append_history(&ActionHistoryRecord {
            id: Uuid::new_v4(),
            action_id: action.id,
            action_type: action.action_type,
            outcome: outcome.to_string(),
            error: error.map(str::to_string),
            recorded_at: Timestamp::now(),
        })?;
        Ok(())
    }
}

fn recorded_outcome(action: &Action) -> ExecutionOutcome {
    match action.status {
        ActionStatus::Failed => ExecutionOutcome {
            success: false,
            result: action.result.clone(),
            error: action.error.clone(),
        },
        _ => ExecutionOutcome {
            success: true,
            result: action.result.clone(),
            error: None,
        },
    }
}

fn require_target(input: &NewAction) -> Result<(), ActionError> {
    if input.target_id.is_none() {
        return Err(ActionError::Validation(format!(
            "{} requires a target id",
            input.action_type
        )));
    }
    Ok(())
}

fn message_param(params: &serde_json::Value) -> Result<String, String> {
    match params.get("message").and_then(|m| m.as_str()) {
        Some(message) if !message.is_empty() => Ok(message.to_string()),
        _ => Err("parameters must carry a non-empty message".to_string()),
    }
}

fn schedule_at_param(params: &serde_json::Value) -> Result<Timestamp, String> {
    params
        .get("at")
        .and_then(|v| v.as_i64())
        .map(Timestamp)
        .ok_or_else(|| "parameters must carry an integer 'at' timestamp".to_string())
}

fn link_params(params: &serde_json::Value) -> Result<(TargetType, Uuid), String> {
    let to_type = params
        .get("link_target_type")
        .and_then(|v| v.as_str())
        .ok_or("parameters must carry link_target_type")?
        .parse::<TargetType>()?;
    let to_id = params
        .get("link_target_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or("parameters must carry a link_target_id uuid")?;
    Ok((to_type, to_id))
}

fn result_uuid(action: &Action, key: &str) -> Result<Uuid, ActionError> {
    action
        .result
        .as_ref()
        .and_then(|r| r.get(key))
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| ActionError::Execution(format!("recorded result is missing {}", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rate_limit::MemoryCounterStore;
    use crate::task_state::RepoTaskStates;
    use loci_core::types::DependencyKind;
    use loci_store::{Database, DependencyStore, MemoryNotifier, MemoryTargetRepository};

    struct Fixture {
        executor: ActionExecutor,
        repo: Arc<MemoryTargetRepository>,
        notifier: Arc<MemoryNotifier>,
        graph: Arc<DependencyGraph>,
        tenant: TenantId,
        user: UserId,
    }

    fn fixture() -> Fixture {
        fixture_with_config(LociConfig::default())
    }

    fn fixture_with_config(config: LociConfig) -> Fixture {
        let db = Arc::new(Database::in_memory().unwrap());
        let actions = Arc::new(ActionStore::new(Arc::clone(&db)));
        let repo = Arc::new(MemoryTargetRepository::new());
        let notifier = Arc::new(MemoryNotifier::new());
        let graph = Arc::new(DependencyGraph::new(
            Arc::new(DependencyStore::new(db)),
            Arc::new(RepoTaskStates::new(
                Arc::clone(&repo) as Arc<dyn TargetRepository>
            )),
        ));
        let executor = ActionExecutor::new(
            actions,
            Arc::clone(&repo) as Arc<dyn TargetRepository>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            Arc::clone(&graph),
            &config,
            Arc::new(MemoryCounterStore::new()),
        );
        Fixture {
            executor,
            repo,
            notifier,
            graph,
            tenant: TenantId(Uuid::new_v4()),
            user: UserId(Uuid::new_v4()),
        }
    }

    fn update_input(f: &Fixture, target_id: Uuid, params: serde_json::Value) -> NewAction {
        NewAction {
            tenant_id: f.tenant,
            user_id: f.user,
            action_type: ActionType::Update,
            target_type: TargetType::Admin,
            target_id: Some(target_id),
            parameters: params,
            requires_approval: Some(false),
        }
    }

    fn notify_input(f: &Fixture, message: &str) -> NewAction {
        NewAction {
            tenant_id: f.tenant,
            user_id: f.user,
            action_type: ActionType::Notify,
            target_type: TargetType::Admin,
            target_id: None,
            parameters: serde_json::json!({"message": message}),
            requires_approval: Some(false),
        }
    }

    // ---- create / validation ----

    #[tokio::test]
    async fn test_create_without_approval_is_auto_approved() {
        let f = fixture();
        let action = f.executor.create(notify_input(&f, "hello")).unwrap();
        assert_eq!(action.status, ActionStatus::Approved);
        assert!(!action.requires_approval);
    }

    #[tokio::test]
    async fn test_create_with_approval_starts_pending() {
        let f = fixture();
        let mut input = notify_input(&f, "hello");
        input.requires_approval = Some(true);
        let action = f.executor.create(input).unwrap();
        assert_eq!(action.status, ActionStatus::Pending);
    }

    #[tokio::test]
    async fn test_absent_approval_flag_follows_policy() {
        let f = fixture();

        // Notify auto-approves by default policy.
        let mut input = notify_input(&f, "hello");
        input.requires_approval = None;
        let action = f.executor.create(input).unwrap();
        assert_eq!(action.status, ActionStatus::Approved);

        // Delete defaults to requiring approval.
        let input = NewAction {
            tenant_id: f.tenant,
            user_id: f.user,
            action_type: ActionType::Delete,
            target_type: TargetType::Idea,
            target_id: Some(Uuid::new_v4()),
            parameters: serde_json::json!({}),
            requires_approval: None,
        };
        let action = f.executor.create(input).unwrap();
        assert_eq!(action.status, ActionStatus::Pending);
    }

    #[tokio::test]
    async fn test_update_without_target_rejected() {
        let f = fixture();
        let input = NewAction {
            tenant_id: f.tenant,
            user_id: f.user,
            action_type: ActionType::Update,
            target_type: TargetType::Admin,
            target_id: None,
            parameters: serde_json::json!({"status": "done"}),
            requires_approval: Some(false),
        };
        let err = f.executor.create(input).unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
    }

    #[tokio::test]
    async fn test_notify_without_message_rejected() {
        let f = fixture();
        let mut input = notify_input(&f, "hello");
        input.parameters = serde_json::json!({});
        let err = f.executor.create(input).unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
    }

    #[tokio::test]
    async fn test_link_with_bad_params_rejected() {
        let f = fixture();
        let input = NewAction {
            tenant_id: f.tenant,
            user_id: f.user,
            action_type: ActionType::Link,
            target_type: TargetType::Project,
            target_id: Some(Uuid::new_v4()),
            parameters: serde_json::json!({"link_target_type": "widget"}),
            requires_approval: Some(false),
        };
        let err = f.executor.create(input).unwrap_err();
        assert!(matches!(err, ActionError::Validation(_)));
    }

    // ---- approve / reject ----

    #[tokio::test]
    async fn test_approve_then_execute_chain() {
        let f = fixture();
        let target = Uuid::new_v4();
        f.repo.seed(
            f.tenant,
            TargetType::Admin,
            target,
            serde_json::json!({"status": "in_progress"}),
        );

        let mut input = update_input(&f, target, serde_json::json!({"status": "done"}));
        input.requires_approval = Some(true);
        let action = f.executor.create(input).unwrap();

        let (approved, outcome) = f
            .executor
            .approve(f.tenant, action.id, f.user, true)
            .await
            .unwrap();
        assert_eq!(approved.status, ActionStatus::Executed);
        assert!(outcome.unwrap().success);

        let record = f
            .repo
            .get(f.tenant, TargetType::Admin, target)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record["status"], "done");
    }

    #[tokio::test]
    async fn test_approve_non_pending_fails() {
        let f = fixture();
        let action = f.executor.create(notify_input(&f, "hi")).unwrap();
        // Already auto-approved.
        let err = f
            .executor
            .approve(f.tenant, action.id, f.user, false)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::StateTransition { .. }));
    }

    #[tokio::test]
    async fn test_reject_records_reason() {
        let f = fixture();
        let mut input = notify_input(&f, "hi");
        input.requires_approval = Some(true);
        let action = f.executor.create(input).unwrap();

        let rejected = f.executor.reject(f.tenant, action.id, "not now").unwrap();
        assert_eq!(rejected.status, ActionStatus::Rejected);
        assert_eq!(rejected.error.as_deref(), Some("not now"));

        // Terminal: a second reject is a transition error.
        let err = f.executor.reject(f.tenant, action.id, "again").unwrap_err();
        assert!(matches!(err, ActionError::StateTransition { .. }));
    }

    #[tokio::test]
    async fn test_missing_action_is_not_found() {
        let f = fixture();
        let err = f
            .executor
            .execute(f.tenant, Uuid::new_v4(), f.user)
            .await
            .unwrap_err();
        assert!(matches!(err, ActionError::NotFound(_)));
    }

    // ---- execute ----

    #[tokio::test]
    async fn test_execute_update_mutates_target() {
        let f = fixture();
        let target = Uuid::new_v4();
        f.repo.seed(
            f.tenant,
            TargetType::Admin,
            target,
            serde_json::json!({"status": "in_progress", "title": "taxes"}),
        );

        let action = f
            .executor
            .create(update_input(&f, target, serde_json::json!({"status": "done"})))
            .unwrap();
        let outcome = f.executor.execute(f.tenant, action.id, f.user).await.unwrap();
        assert!(outcome.success);

        let stored = f.executor.get(f.tenant, action.id).unwrap();
        assert_eq!(stored.status, ActionStatus::Executed);
        assert_eq!(
            stored.prior_state.as_ref().unwrap()["status"],
            "in_progress"
        );
        assert!(stored.executed_at.is_some());

        let record = f
            .repo
            .get(f.tenant, TargetType::Admin, target)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record["status"], "done");
        assert_eq!(record["title"], "taxes");
    }

    #[tokio::test]
    async fn test_execute_unapproved_is_transition_error() {
        let f = fixture();
        let mut input = notify_input(&f, "hi");
        input.requires_approval = Some(true);
        let action = f.executor.create(input).unwrap();

        let err = f.executor.execute(f.tenant, action.id, f.user).await.unwrap_err();
        assert!(matches!(
            err,
            ActionError::StateTransition {
                from: ActionStatus::Pending,
                to: ActionStatus::Executed,
            }
        ));
    }

    #[tokio::test]
    async fn test_execute_is_idempotent() {
        let f = fixture();
        let action = f.executor.create(notify_input(&f, "once")).unwrap();

        let first = f.executor.execute(f.tenant, action.id, f.user).await.unwrap();
        let second = f.executor.execute(f.tenant, action.id, f.user).await.unwrap();

        assert!(first.success);
        assert!(second.success);
        assert_eq!(first.result, second.result);
        // The notification was delivered exactly once.
        assert_eq!(f.notifier.notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_execute_failure_settles_failed() {
        let f = fixture();
        // Target does not exist in the repository.
        let action = f
            .executor
            .create(update_input(&f, Uuid::new_v4(), serde_json::json!({"x": 1})))
            .unwrap();

        let outcome = f.executor.execute(f.tenant, action.id, f.user).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("not found"));

        let stored = f.executor.get(f.tenant, action.id).unwrap();
        assert_eq!(stored.status, ActionStatus::Failed);
        assert!(stored.prior_state.is_none());

        // Re-invoking returns the recorded failure without retrying.
        let again = f.executor.execute(f.tenant, action.id, f.user).await.unwrap();
        assert!(!again.success);
    }

    #[tokio::test]
    async fn test_execute_create_returns_record_with_id() {
        let f = fixture();
        let input = NewAction {
            tenant_id: f.tenant,
            user_id: f.user,
            action_type: ActionType::Create,
            target_type: TargetType::Project,
            target_id: None,
            parameters: serde_json::json!({"name": "Apollo"}),
            requires_approval: Some(false),
        };
        let action = f.executor.create(input).unwrap();
        let outcome = f.executor.execute(f.tenant, action.id, f.user).await.unwrap();

        let result = outcome.result.unwrap();
        assert_eq!(result["name"], "Apollo");
        let id = Uuid::parse_str(result["id"].as_str().unwrap()).unwrap();
        assert!(f
            .repo
            .get(f.tenant, TargetType::Project, id)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_notification_rate_limit_fails_execution() {
        let mut config = LociConfig::default();
        config.approval.max_notifications_per_minute = 1;
        let f = fixture_with_config(config);

        let first = f.executor.create(notify_input(&f, "one")).unwrap();
        let outcome = f.executor.execute(f.tenant, first.id, f.user).await.unwrap();
        assert!(outcome.success);

        let second = f.executor.create(notify_input(&f, "two")).unwrap();
        let outcome = f.executor.execute(f.tenant, second.id, f.user).await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("rate limit"));
    }

    // ---- cascade ----

    #[tokio::test]
    async fn test_status_update_cascades_through_graph() {
        let f = fixture();
        let (task1, task2) = (Uuid::new_v4(), Uuid::new_v4());
        f.repo.seed(
            f.tenant,
            TargetType::Admin,
            task1,
            serde_json::json!({"status": "in_progress"}),
        );
        f.repo.seed(
            f.tenant,
            TargetType::Admin,
            task2,
            serde_json::json!({"status": "blocked"}),
        );
        f.graph
            .add_dependency(f.tenant, task2, task1, DependencyKind::BlockedBy)
            .await
            .unwrap();

        let action = f
            .executor
            .create(update_input(&f, task1, serde_json::json!({"status": "done"})))
            .unwrap();
        let outcome = f.executor.execute(f.tenant, action.id, f.user).await.unwrap();
        assert!(outcome.success);

        let record = f
            .repo
            .get(f.tenant, TargetType::Admin, task2)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record["status"], "todo", "blocked task auto-transitions to todo");
    }

    // ---- rollback ----

    #[tokio::test]
    async fn test_rollback_update_restores_prior_values() {
        let f = fixture();
        let target = Uuid::new_v4();
        f.repo.seed(
            f.tenant,
            TargetType::Admin,
            target,
            serde_json::json!({"status": "in_progress", "title": "taxes"}),
        );
        let action = f
            .executor
            .create(update_input(&f, target, serde_json::json!({"status": "done"})))
            .unwrap();
        f.executor.execute(f.tenant, action.id, f.user).await.unwrap();

        let rolled = f.executor.rollback(f.tenant, action.id).await.unwrap();
        assert_eq!(rolled.status, ActionStatus::RolledBack);
        assert!(rolled.rolled_back_at.is_some());

        let record = f
            .repo
            .get(f.tenant, TargetType::Admin, target)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record["status"], "in_progress");
    }

    #[tokio::test]
    async fn test_rollback_delete_restores_original_id() {
        let f = fixture();
        let target = Uuid::new_v4();
        f.repo.seed(
            f.tenant,
            TargetType::Idea,
            target,
            serde_json::json!({"text": "memory palace"}),
        );
        let input = NewAction {
            tenant_id: f.tenant,
            user_id: f.user,
            action_type: ActionType::Delete,
            target_type: TargetType::Idea,
            target_id: Some(target),
            parameters: serde_json::json!({}),
            requires_approval: Some(false),
        };
        let action = f.executor.create(input).unwrap();
        f.executor.execute(f.tenant, action.id, f.user).await.unwrap();
        assert!(f.repo.get(f.tenant, TargetType::Idea, target).await.unwrap().is_none());

        f.executor.rollback(f.tenant, action.id).await.unwrap();
        let restored = f
            .repo
            .get(f.tenant, TargetType::Idea, target)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restored["text"], "memory palace");
    }

    #[tokio::test]
    async fn test_rollback_create_deletes_record() {
        let f = fixture();
        let input = NewAction {
            tenant_id: f.tenant,
            user_id: f.user,
            action_type: ActionType::Create,
            target_type: TargetType::Person,
            target_id: None,
            parameters: serde_json::json!({"name": "Ada"}),
            requires_approval: Some(false),
        };
        let action = f.executor.create(input).unwrap();
        let outcome = f.executor.execute(f.tenant, action.id, f.user).await.unwrap();
        let created_id =
            Uuid::parse_str(outcome.result.unwrap()["id"].as_str().unwrap()).unwrap();

        f.executor.rollback(f.tenant, action.id).await.unwrap();
        assert!(f
            .repo
            .get(f.tenant, TargetType::Person, created_id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_rollback_notify_voids_notification() {
        let f = fixture();
        let action = f.executor.create(notify_input(&f, "oops")).unwrap();
        f.executor.execute(f.tenant, action.id, f.user).await.unwrap();

        f.executor.rollback(f.tenant, action.id).await.unwrap();
        let delivered = f.notifier.notifications();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].voided);
    }

    #[tokio::test]
    async fn test_rollback_twice_unavailable() {
        let f = fixture();
        let action = f.executor.create(notify_input(&f, "hi")).unwrap();
        f.executor.execute(f.tenant, action.id, f.user).await.unwrap();
        f.executor.rollback(f.tenant, action.id).await.unwrap();

        let err = f.executor.rollback(f.tenant, action.id).await.unwrap_err();
        assert!(matches!(err, ActionError::RollbackUnavailable(_)));
    }

    #[tokio::test]
    async fn test_rollback_failed_action_unavailable() {
        let f = fixture();
        let action = f
            .executor
            .create(update_input(&f, Uuid::new_v4(), serde_json::json!({"x": 1})))
            .unwrap();
        f.executor.execute(f.tenant, action.id, f.user).await.unwrap();

        let err = f.executor.rollback(f.tenant, action.id).await.unwrap_err();
        assert!(matches!(err, ActionError::RollbackUnavailable(_)));
    }

    // ---- history / expiry ----

    #[tokio::test]
    async fn test_execute_appends_exactly_one_history_record() {
        let f = fixture();
        let action = f.executor.create(notify_input(&f, "hi")).unwrap();
        f.executor.execute(f.tenant, action.id, f.user).await.unwrap();
        // Idempotent re-invoke must not add another record.
        f.executor.execute(f.tenant, action.id, f.user).await.unwrap();

        let history = f.executor.history(action.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, "executed");
    }

    #[tokio::test]
    async fn test_expire_stale_rejects_old_pending_only() {
        let f = fixture();
        let mut fresh = notify_input(&f, "fresh");
        fresh.requires_approval = Some(true);
        let fresh = f.executor.create(fresh).unwrap();

        // Insert a pending action backdated past the TTL.
        let mut input = notify_input(&f, "old");
        input.requires_approval = Some(true);
        let mut old = f.executor.create(input).unwrap();
        old.id = Uuid::new_v4();
        old.created_at = Timestamp(Timestamp::now().0 - 30 * 86400);
        f.executor.actions.insert(&old).unwrap();

        let expired = f.executor.expire_stale(f.tenant).unwrap();
        assert_eq!(expired, vec![old.id]);

        let rejected = f.executor.get(f.tenant, old.id).unwrap();
        assert_eq!(rejected.status, ActionStatus::Rejected);
        assert_eq!(rejected.error.as_deref(), Some("approval window expired"));

        assert_eq!(
            f.executor.get(f.tenant, fresh.id).unwrap().status,
            ActionStatus::Pending
        );
    }
}
