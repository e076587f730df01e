//! Rule-based fallback planner.
//!
//! A local, deterministic `Planner` for deployments without an AI
//! collaborator: splits the request into clauses and classifies each
//! with compiled regex patterns. Steps are chained sequentially, each
//! depending on the previous clause.

use async_trait::async_trait;
use regex::Regex;

use loci_core::types::{ActionType, TargetType};
use loci_resilience::OutboundError;

use crate::planner::{PlannedStep, Planner};

/// A compiled clause pattern linked to an action and target.
struct ClausePattern {
    regex: Regex,
    action_type: ActionType,
    target_type: TargetType,
}

/// Deterministic keyword planner.
pub struct KeywordPlanner {
    patterns: Vec<ClausePattern>,
    splitter: Regex,
}

impl Default for KeywordPlanner {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordPlanner {
    pub fn new() -> Self {
        let defs: Vec<(&str, ActionType, TargetType)> = vec![
            (
                r"(?i)\b(?:create|add|new|start)\b.*\bproject\b",
                ActionType::Create,
                TargetType::Project,
            ),
            (
                r"(?i)\b(?:create|add|new)\b.*\b(?:person|contact)\b",
                ActionType::Create,
                TargetType::Person,
            ),
            (
                r"(?i)\b(?:capture|create|add|note)\b.*\bidea\b",
                ActionType::Create,
                TargetType::Idea,
            ),
            (
                r"(?i)\b(?:create|add|new)\b.*\btask\b",
                ActionType::Create,
                TargetType::Admin,
            ),
            (
                r"(?i)\blink\b",
                ActionType::Link,
                TargetType::Project,
            ),
            (
                r"(?i)\b(?:remind\s+me|reminder|schedule)\b",
                ActionType::Schedule,
                TargetType::Admin,
            ),
            (
                r"(?i)\b(?:notify|tell|ping)\s+me\b",
                ActionType::Notify,
                TargetType::Admin,
            ),
        ];

        let patterns = defs
            .into_iter()
            .map(|(pat, action_type, target_type)| ClausePattern {
                regex: Regex::new(pat).expect("Invalid clause regex"),
                action_type,
                target_type,
            })
            .collect();

        Self {
            patterns,
            splitter: Regex::new(r"(?i)\s*(?:\band\s+then\b|\bthen\b|\band\b|[;,])\s*")
                .expect("Invalid splitter regex"),
        }
    }

    fn classify(&self, clause: &str) -> Option<(ActionType, TargetType)> {
        self.patterns
            .iter()
            .find(|p| p.regex.is_match(clause))
            .map(|p| (p.action_type, p.target_type))
    }
}

#[async_trait]
impl Planner for KeywordPlanner {
    async fn decompose(&self, request: &str) -> Result<Vec<PlannedStep>, OutboundError> {
        let mut steps = Vec::new();

        for clause in self.splitter.split(request) {
            let clause = clause.trim();
            if clause.is_empty() {
                continue;
            }
            let Some((action_type, target_type)) = self.classify(clause) else {
                continue;
            };

            let step_order = steps.len() as u32 + 1;
            let action_params = match action_type {
                ActionType::Create => serde_json::json!({"name": clause}),
                ActionType::Notify => serde_json::json!({"message": clause}),
                // Without a parsed time, schedule an hour out; the user
                // adjusts from the review surface.
                ActionType::Schedule => serde_json::json!({
                    "message": clause,
                    "at": loci_core::types::Timestamp::now().0 + 3600,
                }),
                _ => serde_json::json!({"note": clause}),
            };

            // Link steps cannot run without ids the planner does not
            // know; surface them as notifications instead.
            let (action_type, action_params) = if action_type == ActionType::Link {
                (
                    ActionType::Notify,
                    serde_json::json!({"message": format!("Link manually: {}", clause)}),
                )
            } else {
                (action_type, action_params)
            };

            steps.push(PlannedStep {
                step_order,
                action_type,
                target_type,
                target_id: None,
                action_params,
                dependencies: if step_order > 1 {
                    vec![step_order - 1]
                } else {
                    vec![]
                },
                description: clause.to_string(),
            });
        }

        Ok(steps)
    }
}
