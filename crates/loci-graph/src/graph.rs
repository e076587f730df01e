//! Dependency graph service: cycle-checked edge insertion and the
//! status cascade.
//!
//! Both `blocks` and `blocked_by` edges are normalized onto one
//! direction internally: (dependent, dependency), meaning the dependent
//! task cannot start until the dependency is done. Cycle detection is an
//! iterative depth-first search over an adjacency map built from the
//! tenant's edges; recursion is never used.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use loci_core::error::LociError;
use loci_core::types::{DependencyKind, TaskDependency, TaskState, TenantId, Timestamp};
use loci_store::DependencyStore;

use crate::error::GraphError;

/// Seam for reading and writing task record states.
///
/// Implemented over the admin-record repository; tests substitute an
/// in-memory map.
#[async_trait]
pub trait TaskStateStore: Send + Sync {
    async fn get_state(
        &self,
        tenant: TenantId,
        task: Uuid,
    ) -> Result<Option<TaskState>, LociError>;

    async fn set_state(
        &self,
        tenant: TenantId,
        task: Uuid,
        state: TaskState,
    ) -> Result<(), LociError>;
}

/// Dependency graph over task records.
pub struct DependencyGraph {
    edges: Arc<DependencyStore>,
    tasks: Arc<dyn TaskStateStore>,
}

impl DependencyGraph {
    pub fn new(edges: Arc<DependencyStore>, tasks: Arc<dyn TaskStateStore>) -> Self {
        Self { edges, tasks }
    }

    /// Insert a dependency edge after vetting it.
    ///
    /// Rejects self-references and edges that would close a cycle; the
    /// store is untouched when the edge is rejected.
    pub async fn add_dependency(
        &self,
        tenant: TenantId,
        task_id: Uuid,
        depends_on_task_id: Uuid,
        kind: DependencyKind,
    ) -> Result<TaskDependency, GraphError> {
        if task_id == depends_on_task_id {
            return Err(GraphError::SelfReference(task_id));
        }

        let existing = self.edges.list(tenant)?;
        let adjacency = build_adjacency(&existing);
        let (dependent, dependency) = normalize(task_id, depends_on_task_id, kind);

        // The new edge closes a cycle iff the dependency already
        // (transitively) depends on the dependent.
        if reaches(&adjacency, dependency, dependent) {
            return Err(GraphError::CyclicDependency {
                task_id,
                depends_on_task_id,
            });
        }

        let edge = TaskDependency {
            task_id,
            depends_on_task_id,
            kind,
            created_at: Timestamp::now(),
        };
        self.edges.insert(tenant, &edge)?;
        tracing::debug!(
            task = %task_id,
            depends_on = %depends_on_task_id,
            kind = %kind,
            "Dependency added"
        );
        Ok(edge)
    }

    /// Remove a dependency edge.
    pub async fn remove_dependency(
        &self,
        tenant: TenantId,
        task_id: Uuid,
        depends_on_task_id: Uuid,
    ) -> Result<(), GraphError> {
        if self.edges.delete(tenant, task_id, depends_on_task_id)? {
            Ok(())
        } else {
            Err(GraphError::NotFound {
                task_id,
                depends_on_task_id,
            })
        }
    }

    /// All edges for a tenant.
    pub fn list(&self, tenant: TenantId) -> Result<Vec<TaskDependency>, GraphError> {
        Ok(self.edges.list(tenant)?)
    }

    /// Cascade a task's status change through the graph.
    ///
    /// When a task reaches `Done`, every task that was blocked on it and
    /// whose blocking dependencies are now all `Done` transitions from
    /// `Blocked` to `Todo`. Returns the ids of unblocked tasks.
    pub async fn on_status_changed(
        &self,
        tenant: TenantId,
        task_id: Uuid,
        new_state: TaskState,
    ) -> Result<Vec<Uuid>, GraphError> {
        if new_state != TaskState::Done {
            return Ok(Vec::new());
        }

        let edges = self.edges.list(tenant)?;
        let adjacency = build_adjacency(&edges);

        let dependents: Vec<Uuid> = adjacency
            .iter()
            .filter(|(_, deps)| deps.contains(&task_id))
            .map(|(dependent, _)| *dependent)
            .collect();

        let mut unblocked = Vec::new();
        for dependent in dependents {
            let current = self.tasks.get_state(tenant, dependent).await?;
            if current != Some(TaskState::Blocked) {
                continue;
            }

            let blockers = adjacency.get(&dependent).cloned().unwrap_or_default();
            let mut all_done = true;
            for blocker in blockers {
                let state = self.tasks.get_state(tenant, blocker).await?;
                if state != Some(TaskState::Done) {
                    all_done = false;
                    break;
                }
            }

            if all_done {
                self.tasks.set_state(tenant, dependent, TaskState::Todo).await?;
                tracing::info!(task = %dependent, "Task unblocked");
                unblocked.push(dependent);
            }
        }
        Ok(unblocked)
    }

    /// Derive and apply a parent task's state from its sub-tasks.
    ///
    /// Returns the new state if one was applied, None when unchanged.
    pub async fn reconcile_parent(
        &self,
        tenant: TenantId,
        parent_id: Uuid,
        sub_task_ids: &[Uuid],
    ) -> Result<Option<TaskState>, GraphError> {
        let mut states = Vec::with_capacity(sub_task_ids.len());
        for id in sub_task_ids {
            if let Some(state) = self.tasks.get_state(tenant, *id).await? {
                states.push(state);
            }
        }

        let Some(derived) = crate::reconcile::derive_parent_state(&states) else {
            return Ok(None);
        };

        if self.tasks.get_state(tenant, parent_id).await? == Some(derived) {
            return Ok(None);
        }

        self.tasks.set_state(tenant, parent_id, derived).await?;
        Ok(Some(derived))
    }
}

/// Normalize an edge onto (dependent, dependency).
fn normalize(task_id: Uuid, depends_on_task_id: Uuid, kind: DependencyKind) -> (Uuid, Uuid) {
    match kind {
        DependencyKind::BlockedBy => (task_id, depends_on_task_id),
        DependencyKind::Blocks => (depends_on_task_id, task_id),
    }
}

/// Adjacency map: dependent -> set of its dependencies.
fn build_adjacency(edges: &[TaskDependency]) -> HashMap<Uuid, HashSet<Uuid>> {
    let mut adjacency: HashMap<Uuid, HashSet<Uuid>> = HashMap::new();
    for edge in edges {
        let (dependent, dependency) =
            normalize(edge.task_id, edge.depends_on_task_id, edge.kind);
        adjacency.entry(dependent).or_default().insert(dependency);
    }
    adjacency
}

/// Iterative DFS: is `to` reachable from `from` over dependency edges?
fn reaches(adjacency: &HashMap<Uuid, HashSet<Uuid>>, from: Uuid, to: Uuid) -> bool {
    let mut stack = vec![from];
    let mut visited = HashSet::new();

    while let Some(node) = stack.pop() {
        if node == to {
            return true;
        }
        if !visited.insert(node) {
            continue;
        }
        if let Some(next) = adjacency.get(&node) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use loci_store::Database;
    use std::sync::Mutex;

    /// In-memory task state map for graph tests.
    #[derive(Default)]
    struct MemoryTaskStates {
        states: Mutex<HashMap<(TenantId, Uuid), TaskState>>,
    }

    #[async_trait]
    impl TaskStateStore for MemoryTaskStates {
        async fn get_state(
            &self,
            tenant: TenantId,
            task: Uuid,
        ) -> Result<Option<TaskState>, LociError> {
            Ok(self.states.lock().unwrap().get(&(tenant, task)).copied())
        }

        async fn set_state(
            &self,
            tenant: TenantId,
            task: Uuid,
            state: TaskState,
        ) -> Result<(), LociError> {
            self.states.lock().unwrap().insert((tenant, task), state);
            Ok(())
        }
    }

    fn graph() -> (DependencyGraph, Arc<MemoryTaskStates>, TenantId) {
        let db = Arc::new(Database::in_memory().unwrap());
        let tasks = Arc::new(MemoryTaskStates::default());
        let graph = DependencyGraph::new(
            Arc::new(DependencyStore::new(db)),
            Arc::clone(&tasks) as Arc<dyn TaskStateStore>,
        );
        (graph, tasks, TenantId(Uuid::new_v4()))
    }

    async fn set(tasks: &MemoryTaskStates, tenant: TenantId, id: Uuid, state: TaskState) {
        tasks.set_state(tenant, id, state).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_dependency() {
        let (graph, _, tenant) = graph();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let edge = graph
            .add_dependency(tenant, a, b, DependencyKind::BlockedBy)
            .await
            .unwrap();
        assert_eq!(edge.task_id, a);
        assert_eq!(edge.depends_on_task_id, b);
        assert_eq!(graph.list(tenant).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_self_reference_rejected() {
        let (graph, _, tenant) = graph();
        let a = Uuid::new_v4();
        let err = graph
            .add_dependency(tenant, a, a, DependencyKind::Blocks)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::SelfReference(_)));
    }

    #[tokio::test]
    async fn test_direct_cycle_rejected_graph_unchanged() {
        let (graph, _, tenant) = graph();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        graph
            .add_dependency(tenant, a, b, DependencyKind::BlockedBy)
            .await
            .unwrap();

        let err = graph
            .add_dependency(tenant, b, a, DependencyKind::BlockedBy)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::CyclicDependency { .. }));

        // The failed insert left the graph unchanged.
        assert_eq!(graph.list(tenant).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transitive_cycle_rejected() {
        let (graph, _, tenant) = graph();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        graph
            .add_dependency(tenant, a, b, DependencyKind::BlockedBy)
            .await
            .unwrap();
        graph
            .add_dependency(tenant, b, c, DependencyKind::BlockedBy)
            .await
            .unwrap();

        // c -> a would close a three-node cycle.
        let err = graph
            .add_dependency(tenant, c, a, DependencyKind::BlockedBy)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::CyclicDependency { .. }));
    }

    #[tokio::test]
    async fn test_blocks_kind_normalizes_to_same_cycle() {
        let (graph, _, tenant) = graph();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        // "a blocks b" is "b blocked_by a".
        graph
            .add_dependency(tenant, a, b, DependencyKind::Blocks)
            .await
            .unwrap();

        // "b blocks a" would invert it.
        let err = graph
            .add_dependency(tenant, b, a, DependencyKind::Blocks)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::CyclicDependency { .. }));
    }

    #[tokio::test]
    async fn test_diamond_is_not_a_cycle() {
        let (graph, _, tenant) = graph();
        let (a, b, c, d) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        // d depends on b and c, both depend on a.
        graph.add_dependency(tenant, b, a, DependencyKind::BlockedBy).await.unwrap();
        graph.add_dependency(tenant, c, a, DependencyKind::BlockedBy).await.unwrap();
        graph.add_dependency(tenant, d, b, DependencyKind::BlockedBy).await.unwrap();
        graph.add_dependency(tenant, d, c, DependencyKind::BlockedBy).await.unwrap();
        assert_eq!(graph.list(tenant).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_remove_dependency() {
        let (graph, _, tenant) = graph();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        graph
            .add_dependency(tenant, a, b, DependencyKind::BlockedBy)
            .await
            .unwrap();

        graph.remove_dependency(tenant, a, b).await.unwrap();
        assert!(graph.list(tenant).unwrap().is_empty());

        let err = graph.remove_dependency(tenant, a, b).await.unwrap_err();
        assert!(matches!(err, GraphError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_done_unblocks_sole_dependent() {
        let (graph, tasks, tenant) = graph();
        let (task1, task2) = (Uuid::new_v4(), Uuid::new_v4());
        graph
            .add_dependency(tenant, task2, task1, DependencyKind::BlockedBy)
            .await
            .unwrap();
        set(&tasks, tenant, task1, TaskState::InProgress).await;
        set(&tasks, tenant, task2, TaskState::Blocked).await;

        // Mark task1 done; task2 must auto-transition to Todo.
        set(&tasks, tenant, task1, TaskState::Done).await;
        let unblocked = graph
            .on_status_changed(tenant, task1, TaskState::Done)
            .await
            .unwrap();
        assert_eq!(unblocked, vec![task2]);
        assert_eq!(
            tasks.get_state(tenant, task2).await.unwrap(),
            Some(TaskState::Todo)
        );
    }

    #[tokio::test]
    async fn test_remaining_blocker_keeps_task_blocked() {
        let (graph, tasks, tenant) = graph();
        let (a, b, dependent) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        graph.add_dependency(tenant, dependent, a, DependencyKind::BlockedBy).await.unwrap();
        graph.add_dependency(tenant, dependent, b, DependencyKind::BlockedBy).await.unwrap();
        set(&tasks, tenant, a, TaskState::Done).await;
        set(&tasks, tenant, b, TaskState::InProgress).await;
        set(&tasks, tenant, dependent, TaskState::Blocked).await;

        let unblocked = graph
            .on_status_changed(tenant, a, TaskState::Done)
            .await
            .unwrap();
        assert!(unblocked.is_empty());
        assert_eq!(
            tasks.get_state(tenant, dependent).await.unwrap(),
            Some(TaskState::Blocked)
        );

        // Finish the second blocker; now the dependent unblocks.
        set(&tasks, tenant, b, TaskState::Done).await;
        let unblocked = graph
            .on_status_changed(tenant, b, TaskState::Done)
            .await
            .unwrap();
        assert_eq!(unblocked, vec![dependent]);
    }

    #[tokio::test]
    async fn test_non_blocked_dependent_untouched() {
        let (graph, tasks, tenant) = graph();
        let (task1, task2) = (Uuid::new_v4(), Uuid::new_v4());
        graph
            .add_dependency(tenant, task2, task1, DependencyKind::BlockedBy)
            .await
            .unwrap();
        set(&tasks, tenant, task1, TaskState::Done).await;
        set(&tasks, tenant, task2, TaskState::InProgress).await;

        let unblocked = graph
            .on_status_changed(tenant, task1, TaskState::Done)
            .await
            .unwrap();
        assert!(unblocked.is_empty());
        assert_eq!(
            tasks.get_state(tenant, task2).await.unwrap(),
            Some(TaskState::InProgress)
        );
    }

    #[tokio::test]
    async fn test_non_done_status_does_not_cascade() {
        let (graph, tasks, tenant) = graph();
        let (task1, task2) = (Uuid::new_v4(), Uuid::new_v4());
        graph
            .add_dependency(tenant, task2, task1, DependencyKind::BlockedBy)
            .await
            .unwrap();
        set(&tasks, tenant, task2, TaskState::Blocked).await;

        let unblocked = graph
            .on_status_changed(tenant, task1, TaskState::InProgress)
            .await
            .unwrap();
        assert!(unblocked.is_empty());
    }

    #[tokio::test]
    async fn test_reconcile_parent_applies_derived_state() {
        let (graph, tasks, tenant) = graph();
        let parent = Uuid::new_v4();
        let subs: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        set(&tasks, tenant, parent, TaskState::Todo).await;
        set(&tasks, tenant, subs[0], TaskState::Done).await;
        set(&tasks, tenant, subs[1], TaskState::InProgress).await;
        set(&tasks, tenant, subs[2], TaskState::Done).await;

        let applied = graph.reconcile_parent(tenant, parent, &subs).await.unwrap();
        assert_eq!(applied, Some(TaskState::InProgress));
        assert_eq!(
            tasks.get_state(tenant, parent).await.unwrap(),
            Some(TaskState::InProgress)
        );
    }

    #[tokio::test]
    async fn test_reconcile_parent_noop_when_already_matching() {
        let (graph, tasks, tenant) = graph();
        let parent = Uuid::new_v4();
        let sub = Uuid::new_v4();
        set(&tasks, tenant, parent, TaskState::Done).await;
        set(&tasks, tenant, sub, TaskState::Done).await;

        let applied = graph.reconcile_parent(tenant, parent, &[sub]).await.unwrap();
        assert!(applied.is_none());
    }
}
