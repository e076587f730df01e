//! Core types and value objects for the orchestration layer.
//!
//! Defines actions, plans, workflows, dependency edges, and their
//! supporting enumerations. All entities are tenant-scoped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Newtype Wrappers
// =============================================================================

/// Identifier of the tenant owning an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub Uuid);

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an acting user within a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub Uuid);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unix timestamp in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(pub i64);

impl Timestamp {
    pub fn now() -> Self {
        Self(Utc::now().timestamp())
    }

    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp())
    }

    pub fn to_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.0, 0).unwrap_or_default()
    }

    pub fn age_days(&self) -> u32 {
        let elapsed = Timestamp::now().0 - self.0;
        (elapsed / 86400) as u32
    }
}

// =============================================================================
// Action Enums
// =============================================================================

/// The kind of mutation an action performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Create,
    Update,
    Delete,
    Link,
    Notify,
    Schedule,
}

impl ActionType {
    pub const ALL: [ActionType; 6] = [
        ActionType::Create,
        ActionType::Update,
        ActionType::Delete,
        ActionType::Link,
        ActionType::Notify,
        ActionType::Schedule,
    ];
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::Link => write!(f, "link"),
            ActionType::Notify => write!(f, "notify"),
            ActionType::Schedule => write!(f, "schedule"),
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(ActionType::Create),
            "update" => Ok(ActionType::Update),
            "delete" => Ok(ActionType::Delete),
            "link" => Ok(ActionType::Link),
            "notify" => Ok(ActionType::Notify),
            "schedule" => Ok(ActionType::Schedule),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}

/// The record family an action targets.
///
/// `Admin` records are the task records the dependency graph cascades over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetType {
    Person,
    Project,
    Idea,
    Admin,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::Person => write!(f, "person"),
            TargetType::Project => write!(f, "project"),
            TargetType::Idea => write!(f, "idea"),
            TargetType::Admin => write!(f, "admin"),
        }
    }
}

impl std::str::FromStr for TargetType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(TargetType::Person),
            "project" => Ok(TargetType::Project),
            "idea" => Ok(TargetType::Idea),
            "admin" => Ok(TargetType::Admin),
            _ => Err(format!("Unknown target type: {}", s)),
        }
    }
}

/// Action lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Approved,
    Rejected,
    Executed,
    Failed,
    RolledBack,
}

impl fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionStatus::Pending => write!(f, "pending"),
            ActionStatus::Approved => write!(f, "approved"),
            ActionStatus::Rejected => write!(f, "rejected"),
            ActionStatus::Executed => write!(f, "executed"),
            ActionStatus::Failed => write!(f, "failed"),
            ActionStatus::RolledBack => write!(f, "rolled_back"),
        }
    }
}

impl std::str::FromStr for ActionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ActionStatus::Pending),
            "approved" => Ok(ActionStatus::Approved),
            "rejected" => Ok(ActionStatus::Rejected),
            "executed" => Ok(ActionStatus::Executed),
            "failed" => Ok(ActionStatus::Failed),
            "rolled_back" => Ok(ActionStatus::RolledBack),
            _ => Err(format!("Unknown action status: {}", s)),
        }
    }
}

// =============================================================================
// Action
// =============================================================================

/// A single gated mutation request against a target resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub action_type: ActionType,
    pub target_type: TargetType,
    pub target_id: Option<Uuid>,
    pub parameters: serde_json::Value,
    pub requires_approval: bool,
    pub status: ActionStatus,
    pub approved_by: Option<UserId>,
    pub approved_at: Option<Timestamp>,
    pub executed_at: Option<Timestamp>,
    pub rolled_back_at: Option<Timestamp>,
    /// Snapshot of the target captured immediately before mutation.
    /// Mandatory for rollback eligibility.
    pub prior_state: Option<serde_json::Value>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: Timestamp,
}

/// Audit record appended after every execute or rollback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionHistoryRecord {
    pub id: Uuid,
    pub action_id: Uuid,
    pub action_type: ActionType,
    pub outcome: String,
    pub error: Option<String>,
    pub recorded_at: Timestamp,
}

// =============================================================================
// Plan
// =============================================================================

/// Plan lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStatus::Pending => write!(f, "pending"),
            PlanStatus::Running => write!(f, "running"),
            PlanStatus::Completed => write!(f, "completed"),
            PlanStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for PlanStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PlanStatus::Pending),
            "running" => Ok(PlanStatus::Running),
            "completed" => Ok(PlanStatus::Completed),
            "failed" => Ok(PlanStatus::Failed),
            _ => Err(format!("Unknown plan status: {}", s)),
        }
    }
}

/// Step lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Completed => write!(f, "completed"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "running" => Ok(StepStatus::Running),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "skipped" => Ok(StepStatus::Skipped),
            _ => Err(format!("Unknown step status: {}", s)),
        }
    }
}

/// One node in a plan's dependency graph.
///
/// `dependencies` holds the `step_order` values of steps that must reach
/// `Completed` before this one may run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub step_order: u32,
    pub action_type: ActionType,
    pub target_type: TargetType,
    pub target_id: Option<Uuid>,
    pub action_params: serde_json::Value,
    pub dependencies: Vec<u32>,
    pub description: String,
    pub status: StepStatus,
    pub error: Option<String>,
}

/// An ordered, dependency-annotated set of actions generated from a
/// natural-language request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub name: String,
    pub description: Option<String>,
    pub request: String,
    pub steps: Vec<PlanStep>,
    pub status: PlanStatus,
    pub created_at: Timestamp,
}

// =============================================================================
// Workflow
// =============================================================================

/// The event class a workflow reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    ItemCreated,
    ItemUpdated,
    ItemDeleted,
    StatusChanged,
    Scheduled,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerType::ItemCreated => write!(f, "item_created"),
            TriggerType::ItemUpdated => write!(f, "item_updated"),
            TriggerType::ItemDeleted => write!(f, "item_deleted"),
            TriggerType::StatusChanged => write!(f, "status_changed"),
            TriggerType::Scheduled => write!(f, "scheduled"),
        }
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "item_created" => Ok(TriggerType::ItemCreated),
            "item_updated" => Ok(TriggerType::ItemUpdated),
            "item_deleted" => Ok(TriggerType::ItemDeleted),
            "status_changed" => Ok(TriggerType::StatusChanged),
            "scheduled" => Ok(TriggerType::Scheduled),
            _ => Err(format!("Unknown trigger type: {}", s)),
        }
    }
}

/// Comparison operator for workflow conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionOperator::Equals => write!(f, "equals"),
            ConditionOperator::NotEquals => write!(f, "not_equals"),
            ConditionOperator::GreaterThan => write!(f, "greater_than"),
            ConditionOperator::LessThan => write!(f, "less_than"),
            ConditionOperator::Contains => write!(f, "contains"),
        }
    }
}

/// A single field/operator/value comparison. Workflow conditions are
/// AND-combined; an empty condition list always matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub operator: ConditionOperator,
    pub value: serde_json::Value,
}

/// Recurrence for scheduled workflows.
///
/// The engine never reads the wall clock; `now` is supplied by the
/// external scheduler collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Schedule {
    Interval { minutes: u32 },
    Daily { hour: u8, minute: u8 },
}

/// Trigger definition: event class plus matching constraints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub trigger_type: TriggerType,
    pub item_type: Option<TargetType>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub schedule: Option<Schedule>,
}

/// Template for an action dispatched by a matching workflow.
///
/// `target_type` defaults to the triggering event's item type when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionTemplate {
    pub action_type: ActionType,
    pub target_type: Option<TargetType>,
    pub parameters: serde_json::Value,
}

/// A persistent trigger+condition+action automation rule.
///
/// Actions dispatched by the workflow act on behalf of `created_by`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub created_by: UserId,
    pub name: String,
    pub trigger: Trigger,
    pub actions: Vec<ActionTemplate>,
    pub priority: i32,
    pub enabled: bool,
    pub last_run_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

/// Partial update for a workflow. Absent fields leave the stored value
/// untouched; `None` means "field absent", not "clear the field".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowPatch {
    pub name: Option<String>,
    pub trigger: Option<Trigger>,
    pub actions: Option<Vec<ActionTemplate>>,
    pub priority: Option<i32>,
    pub enabled: Option<bool>,
}

impl WorkflowPatch {
    /// Overlay the present fields onto a workflow.
    pub fn apply_to(&self, workflow: &mut Workflow) {
        if let Some(name) = &self.name {
            workflow.name = name.clone();
        }
        if let Some(trigger) = &self.trigger {
            workflow.trigger = trigger.clone();
        }
        if let Some(actions) = &self.actions {
            workflow.actions = actions.clone();
        }
        if let Some(priority) = self.priority {
            workflow.priority = priority;
        }
        if let Some(enabled) = self.enabled {
            workflow.enabled = enabled;
        }
    }
}

// =============================================================================
// Task Dependencies
// =============================================================================

/// Direction of a dependency edge as supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DependencyKind {
    Blocks,
    BlockedBy,
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyKind::Blocks => write!(f, "blocks"),
            DependencyKind::BlockedBy => write!(f, "blocked_by"),
        }
    }
}

impl std::str::FromStr for DependencyKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocks" => Ok(DependencyKind::Blocks),
            "blocked_by" => Ok(DependencyKind::BlockedBy),
            _ => Err(format!("Unknown dependency kind: {}", s)),
        }
    }
}

/// A directed edge between two task records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskDependency {
    pub task_id: Uuid,
    pub depends_on_task_id: Uuid,
    pub kind: DependencyKind,
    pub created_at: Timestamp,
}

/// Status vocabulary of admin (task) records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Todo,
    InProgress,
    Blocked,
    Done,
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Todo => write!(f, "todo"),
            TaskState::InProgress => write!(f, "in_progress"),
            TaskState::Blocked => write!(f, "blocked"),
            TaskState::Done => write!(f, "done"),
        }
    }
}

impl std::str::FromStr for TaskState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(TaskState::Todo),
            "in_progress" => Ok(TaskState::InProgress),
            "blocked" => Ok(TaskState::Blocked),
            "done" => Ok(TaskState::Done),
            _ => Err(format!("Unknown task state: {}", s)),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_display_from_str_round_trip() {
        for variant in ActionType::ALL {
            let s = variant.to_string();
            let parsed: ActionType = s.parse().unwrap();
            assert_eq!(variant, parsed);
        }
        assert!("invalid".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_target_type_display_from_str_round_trip() {
        for variant in [
            TargetType::Person,
            TargetType::Project,
            TargetType::Idea,
            TargetType::Admin,
        ] {
            let s = variant.to_string();
            let parsed: TargetType = s.parse().unwrap();
            assert_eq!(variant, parsed);
        }
        assert!("widget".parse::<TargetType>().is_err());
    }

    #[test]
    fn test_action_status_display_from_str_round_trip() {
        for variant in [
            ActionStatus::Pending,
            ActionStatus::Approved,
            ActionStatus::Rejected,
            ActionStatus::Executed,
            ActionStatus::Failed,
            ActionStatus::RolledBack,
        ] {
            let s = variant.to_string();
            let parsed: ActionStatus = s.parse().unwrap();
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn test_action_status_serde_json_format() {
        assert_eq!(
            serde_json::to_string(&ActionStatus::RolledBack).unwrap(),
            "\"rolled_back\""
        );
        assert_eq!(
            serde_json::to_string(&ActionStatus::Pending).unwrap(),
            "\"pending\""
        );
    }

    #[test]
    fn test_step_status_round_trip() {
        for variant in [
            StepStatus::Pending,
            StepStatus::Running,
            StepStatus::Completed,
            StepStatus::Failed,
            StepStatus::Skipped,
        ] {
            let json = serde_json::to_string(&variant).unwrap();
            let rt: StepStatus = serde_json::from_str(&json).unwrap();
            assert_eq!(variant, rt);
        }
    }

    #[test]
    fn test_trigger_type_round_trip() {
        for variant in [
            TriggerType::ItemCreated,
            TriggerType::ItemUpdated,
            TriggerType::ItemDeleted,
            TriggerType::StatusChanged,
            TriggerType::Scheduled,
        ] {
            let s = variant.to_string();
            let parsed: TriggerType = s.parse().unwrap();
            assert_eq!(variant, parsed);
        }
    }

    #[test]
    fn test_task_state_round_trip() {
        for variant in [
            TaskState::Todo,
            TaskState::InProgress,
            TaskState::Blocked,
            TaskState::Done,
        ] {
            let s = variant.to_string();
            let parsed: TaskState = s.parse().unwrap();
            assert_eq!(variant, parsed);
        }
        assert!("paused".parse::<TaskState>().is_err());
    }

    #[test]
    fn test_dependency_kind_round_trip() {
        assert_eq!("blocks".parse::<DependencyKind>().unwrap(), DependencyKind::Blocks);
        assert_eq!(
            "blocked_by".parse::<DependencyKind>().unwrap(),
            DependencyKind::BlockedBy
        );
        assert!("requires".parse::<DependencyKind>().is_err());
    }

    #[test]
    fn test_timestamp_datetime_round_trip() {
        let ts = Timestamp(1_700_000_000);
        let dt = ts.to_datetime();
        assert_eq!(Timestamp::from_datetime(dt), ts);
    }

    #[test]
    fn test_action_serde_round_trip() {
        let action = Action {
            id: Uuid::new_v4(),
            tenant_id: TenantId(Uuid::new_v4()),
            user_id: UserId(Uuid::new_v4()),
            action_type: ActionType::Update,
            target_type: TargetType::Admin,
            target_id: Some(Uuid::new_v4()),
            parameters: serde_json::json!({"status": "done"}),
            requires_approval: true,
            status: ActionStatus::Pending,
            approved_by: None,
            approved_at: None,
            executed_at: None,
            rolled_back_at: None,
            prior_state: None,
            result: None,
            error: None,
            created_at: Timestamp::now(),
        };
        let json = serde_json::to_string(&action).unwrap();
        let rt: Action = serde_json::from_str(&json).unwrap();
        assert_eq!(action.id, rt.id);
        assert_eq!(action.action_type, rt.action_type);
        assert_eq!(action.target_type, rt.target_type);
        assert_eq!(action.status, rt.status);
        assert_eq!(action.parameters, rt.parameters);
    }

    #[test]
    fn test_plan_step_serde_round_trip() {
        let step = PlanStep {
            step_order: 2,
            action_type: ActionType::Link,
            target_type: TargetType::Project,
            target_id: None,
            action_params: serde_json::json!({"link_target_type": "person"}),
            dependencies: vec![1],
            description: "link the owner".to_string(),
            status: StepStatus::Pending,
            error: None,
        };
        let json = serde_json::to_string(&step).unwrap();
        let rt: PlanStep = serde_json::from_str(&json).unwrap();
        assert_eq!(rt.step_order, 2);
        assert_eq!(rt.dependencies, vec![1]);
        assert_eq!(rt.action_type, ActionType::Link);
    }

    #[test]
    fn test_schedule_serde_tagged_format() {
        let s = Schedule::Interval { minutes: 30 };
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"kind\":\"interval\""));
        let rt: Schedule = serde_json::from_str(&json).unwrap();
        assert_eq!(rt, s);

        let d = Schedule::Daily { hour: 9, minute: 15 };
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("\"kind\":\"daily\""));
        let rt: Schedule = serde_json::from_str(&json).unwrap();
        assert_eq!(rt, d);
    }

    #[test]
    fn test_trigger_conditions_default_empty() {
        let json = r#"{"trigger_type":"item_created","item_type":"admin","schedule":null}"#;
        let trigger: Trigger = serde_json::from_str(json).unwrap();
        assert!(trigger.conditions.is_empty());
        assert_eq!(trigger.trigger_type, TriggerType::ItemCreated);
    }

    #[test]
    fn test_workflow_patch_default_all_absent() {
        let patch = WorkflowPatch::default();
        assert!(patch.name.is_none());
        assert!(patch.trigger.is_none());
        assert!(patch.actions.is_none());
        assert!(patch.priority.is_none());
        assert!(patch.enabled.is_none());
    }

    #[test]
    fn test_enums_are_hashable_map_keys() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(ActionType::Delete, "dangerous");
        map.insert(ActionType::Notify, "safe");
        assert_eq!(map.get(&ActionType::Delete), Some(&"dangerous"));
        assert_eq!(map.get(&ActionType::Create), None);
    }
}
