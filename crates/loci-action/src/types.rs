//! Input and result types for the action executor.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use loci_core::types::{ActionType, TargetType, TenantId, UserId};

/// Input for creating an action.
///
/// `requires_approval` is deliberately an `Option`: absent means "follow
/// the per-action-type policy from configuration", which is not the same
/// as an explicit `false`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAction {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub action_type: ActionType,
    pub target_type: TargetType,
    pub target_id: Option<Uuid>,
    #[serde(default = "default_parameters")]
    pub parameters: serde_json::Value,
    pub requires_approval: Option<bool>,
}

fn default_parameters() -> serde_json::Value {
    serde_json::json!({})
}

/// Structured result of an execute call.
///
/// A mutation failure is carried here (`success: false`) rather than
/// thrown, so partial plan and workflow progress stays inspectable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ExecutionOutcome {
    pub fn succeeded(result: serde_json::Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_action_parameters_default_to_empty_object() {
        let json = format!(
            r#"{{"tenant_id":"{}","user_id":"{}","action_type":"notify",
                "target_type":"admin","target_id":null,"requires_approval":null}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let input: NewAction = serde_json::from_str(&json).unwrap();
        assert!(input.parameters.is_object());
        assert!(input.requires_approval.is_none());
    }

    #[test]
    fn test_outcome_constructors() {
        let ok = ExecutionOutcome::succeeded(serde_json::json!({"id": 1}));
        assert!(ok.success);
        assert!(ok.error.is_none());

        let failed = ExecutionOutcome::failed("target vanished");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("target vanished"));
        assert!(failed.result.is_none());
    }

    #[test]
    fn test_outcome_serde_round_trip() {
        let outcome = ExecutionOutcome::failed("boom");
        let json = serde_json::to_string(&outcome).unwrap();
        let rt: ExecutionOutcome = serde_json::from_str(&json).unwrap();
        assert!(!rt.success);
        assert_eq!(rt.error.as_deref(), Some("boom"));
    }
}
