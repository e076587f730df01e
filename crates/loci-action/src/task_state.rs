//! Adapter exposing admin records to the dependency graph.
//!
//! The graph only cares about the `status` field of admin (task)
//! records; this adapter reads and writes it through the target
//! repository so the cascade uses the same storage as every other
//! mutation.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use loci_core::error::LociError;
use loci_core::types::{TargetType, TaskState, TenantId};
use loci_graph::TaskStateStore;
use loci_store::TargetRepository;

/// `TaskStateStore` backed by the admin-record repository.
pub struct RepoTaskStates {
    repo: Arc<dyn TargetRepository>,
}

impl RepoTaskStates {
    pub fn new(repo: Arc<dyn TargetRepository>) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl TaskStateStore for RepoTaskStates {
    async fn get_state(
        &self,
        tenant: TenantId,
        task: Uuid,
    ) -> Result<Option<TaskState>, LociError> {
        let record = self.repo.get(tenant, TargetType::Admin, task).await?;
        Ok(record
            .and_then(|r| r.get("status").and_then(|s| s.as_str()).map(str::to_string))
            .and_then(|s| s.parse().ok()))
    }

    async fn set_state(
        &self,
        tenant: TenantId,
        task: Uuid,
        state: TaskState,
    ) -> Result<(), LociError> {
        self.repo
            .update(
                tenant,
                TargetType::Admin,
                task,
                serde_json::json!({"status": state.to_string()}),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loci_store::MemoryTargetRepository;

    #[tokio::test]
    async fn test_reads_status_field() {
        let repo = Arc::new(MemoryTargetRepository::new());
        let tenant = TenantId(Uuid::new_v4());
        let id = Uuid::new_v4();
        repo.seed(
            tenant,
            TargetType::Admin,
            id,
            serde_json::json!({"title": "file taxes", "status": "blocked"}),
        );

        let states = RepoTaskStates::new(repo);
        assert_eq!(
            states.get_state(tenant, id).await.unwrap(),
            Some(TaskState::Blocked)
        );
    }

    #[tokio::test]
    async fn test_missing_record_or_status_is_none() {
        let repo = Arc::new(MemoryTargetRepository::new());
        let tenant = TenantId(Uuid::new_v4());
        let states = RepoTaskStates::new(Arc::clone(&repo) as Arc<dyn TargetRepository>);

        assert!(states.get_state(tenant, Uuid::new_v4()).await.unwrap().is_none());

        let id = Uuid::new_v4();
        repo.seed(tenant, TargetType::Admin, id, serde_json::json!({"title": "no status"}));
        assert!(states.get_state(tenant, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_state_writes_through() {
        let repo = Arc::new(MemoryTargetRepository::new());
        let tenant = TenantId(Uuid::new_v4());
        let id = Uuid::new_v4();
        repo.seed(tenant, TargetType::Admin, id, serde_json::json!({"status": "blocked"}));

        let states = RepoTaskStates::new(Arc::clone(&repo) as Arc<dyn TargetRepository>);
        states.set_state(tenant, id, TaskState::Todo).await.unwrap();

        let record = repo.get(tenant, TargetType::Admin, id).await.unwrap().unwrap();
        assert_eq!(record["status"], "todo");
    }
}
