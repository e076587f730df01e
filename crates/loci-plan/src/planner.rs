//! Planner collaborator contract.
//!
//! The planner is the external AI service that decomposes a
//! natural-language request into ordered steps. It lives outside this
//! process, so it speaks `OutboundError` and is always called through
//! the resilience wrappers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use loci_core::types::{ActionType, TargetType};
use loci_resilience::OutboundError;

/// One step proposed by the planner (or supplied to `create`).
///
/// `dependencies` reference `step_order` values of other steps in the
/// same list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannedStep {
    pub step_order: u32,
    pub action_type: ActionType,
    pub target_type: TargetType,
    pub target_id: Option<Uuid>,
    #[serde(default = "default_params")]
    pub action_params: serde_json::Value,
    #[serde(default)]
    pub dependencies: Vec<u32>,
    pub description: String,
}

fn default_params() -> serde_json::Value {
    serde_json::json!({})
}

/// Decomposes a natural-language request into plan steps.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn decompose(&self, request: &str) -> Result<Vec<PlannedStep>, OutboundError>;
}
