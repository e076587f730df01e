//! Step graph validation and topological ordering.
//!
//! Kahn's algorithm over an index-keyed adjacency list, with
//! deterministic ascending-step-order tie-breaking. Used both to vet a
//! plan at creation time and to fix the execution order.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::PlanError;
use crate::planner::PlannedStep;

/// Compute a topological order over `step_order` values.
///
/// Rejects duplicate orders, dependencies on unknown or self steps, and
/// cycles. The returned order is deterministic: among ready steps the
/// lowest `step_order` comes first.
pub fn topological_order(steps: &[PlannedStep]) -> Result<Vec<u32>, PlanError> {
    let orders: HashSet<u32> = steps.iter().map(|s| s.step_order).collect();
    if orders.len() != steps.len() {
        return Err(PlanError::Validation(
            "step orders must be unique within a plan".to_string(),
        ));
    }

    let mut in_degree: HashMap<u32, usize> = HashMap::new();
    let mut dependents: HashMap<u32, Vec<u32>> = HashMap::new();

    for step in steps {
        in_degree.entry(step.step_order).or_insert(0);
        for dep in &step.dependencies {
            if *dep == step.step_order {
                return Err(PlanError::Validation(format!(
                    "step {} depends on itself",
                    step.step_order
                )));
            }
            if !orders.contains(dep) {
                return Err(PlanError::UnknownDependency {
                    step_order: step.step_order,
                    dependency: *dep,
                });
            }
            *in_degree.entry(step.step_order).or_insert(0) += 1;
            dependents.entry(*dep).or_default().push(step.step_order);
        }
    }

    let mut ready: Vec<u32> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(order, _)| *order)
        .collect();
    ready.sort_unstable();
    let mut queue: VecDeque<u32> = ready.into();

    let mut ordered = Vec::with_capacity(steps.len());
    while let Some(order) = queue.pop_front() {
        ordered.push(order);
        let mut unlocked = Vec::new();
        for dependent in dependents.get(&order).into_iter().flatten() {
            let degree = in_degree
                .get_mut(dependent)
                .expect("dependent was registered above");
            *degree -= 1;
            if *degree == 0 {
                unlocked.push(*dependent);
            }
        }
        unlocked.sort_unstable();
        for order in unlocked {
            queue.push_back(order);
        }
    }

    if ordered.len() != steps.len() {
        let done: HashSet<u32> = ordered.iter().copied().collect();
        let mut stuck: Vec<u32> = orders.difference(&done).copied().collect();
        stuck.sort_unstable();
        let stuck: Vec<String> = stuck.iter().map(|o| o.to_string()).collect();
        return Err(PlanError::CyclicPlan(format!("steps {}", stuck.join(", "))));
    }

    Ok(ordered)
}
