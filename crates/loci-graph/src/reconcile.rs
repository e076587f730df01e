//! Parent status derivation from sub-task states.

use loci_core::types::TaskState;

/// Derive a parent task's state from its sub-tasks.
///
/// Precedence: any `Blocked` sub-task makes the parent `Blocked`; else
/// any `InProgress` makes it `InProgress`; else all `Done` makes it
/// `Done`. Any other mix (including no sub-tasks) leaves the parent
/// unchanged, signalled by `None`.
pub fn derive_parent_state(sub_states: &[TaskState]) -> Option<TaskState> {
    if sub_states.is_empty() {
        return None;
    }

    if sub_states.contains(&TaskState::Blocked) {
        return Some(TaskState::Blocked);
    }
    if sub_states.contains(&TaskState::InProgress) {
        return Some(TaskState::InProgress);
    }
    if sub_states.iter().all(|s| *s == TaskState::Done) {
        return Some(TaskState::Done);
    }
    None
}
