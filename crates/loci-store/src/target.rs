//! Collaborator contracts consumed by the action executor.
//!
//! `TargetRepository` is the seam to the record CRUD layer
//! (people/projects/ideas/admin storage); `Notifier` is the seam to the
//! notification/reminder integration. Both ship with in-memory
//! implementations used by tests and single-process deployments.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use loci_core::error::LociError;
use loci_core::types::{TargetType, TenantId, Timestamp, UserId};
use loci_resilience::OutboundError;

/// Record CRUD operations the executor dispatches to.
///
/// `restore` re-creates a deleted record under its original id; rollback
/// of a delete depends on it.
#[async_trait]
pub trait TargetRepository: Send + Sync {
    async fn get(
        &self,
        tenant: TenantId,
        target_type: TargetType,
        id: Uuid,
    ) -> Result<Option<serde_json::Value>, LociError>;

    /// Create a record from `data`; returns the stored record including
    /// its generated `id`.
    async fn create(
        &self,
        tenant: TenantId,
        target_type: TargetType,
        data: serde_json::Value,
    ) -> Result<serde_json::Value, LociError>;

    /// Shallow-merge `patch` into the record; returns the updated record.
    async fn update(
        &self,
        tenant: TenantId,
        target_type: TargetType,
        id: Uuid,
        patch: serde_json::Value,
    ) -> Result<serde_json::Value, LociError>;

    async fn delete(
        &self,
        tenant: TenantId,
        target_type: TargetType,
        id: Uuid,
    ) -> Result<(), LociError>;

    /// Re-create a record under the given id from a snapshot.
    async fn restore(
        &self,
        tenant: TenantId,
        target_type: TargetType,
        id: Uuid,
        data: serde_json::Value,
    ) -> Result<serde_json::Value, LociError>;

    async fn link(
        &self,
        tenant: TenantId,
        from_type: TargetType,
        from_id: Uuid,
        to_type: TargetType,
        to_id: Uuid,
    ) -> Result<(), LociError>;

    async fn unlink(
        &self,
        tenant: TenantId,
        from_type: TargetType,
        from_id: Uuid,
        to_type: TargetType,
        to_id: Uuid,
    ) -> Result<(), LociError>;
}

/// Notification and reminder delivery.
///
/// These calls leave the process, so they speak `OutboundError` and run
/// under the resilience wrappers at the call site.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification; returns its id for later voiding.
    async fn notify(
        &self,
        tenant: TenantId,
        user: UserId,
        message: &str,
    ) -> Result<Uuid, OutboundError>;

    /// Best-effort inverse of `notify`.
    async fn void_notification(&self, tenant: TenantId, id: Uuid) -> Result<(), OutboundError>;

    /// Schedule a reminder; returns its id for later cancellation.
    async fn schedule_reminder(
        &self,
        tenant: TenantId,
        user: UserId,
        message: &str,
        at: Timestamp,
    ) -> Result<Uuid, OutboundError>;

    async fn cancel_reminder(&self, tenant: TenantId, id: Uuid) -> Result<(), OutboundError>;
}

// =============================================================================
// In-memory implementations
// =============================================================================

type RecordKey = (TenantId, TargetType);
type LinkKey = (TenantId, TargetType, Uuid, TargetType, Uuid);

/// In-memory target repository for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryTargetRepository {
    records: Mutex<HashMap<RecordKey, HashMap<Uuid, serde_json::Value>>>,
    links: Mutex<HashSet<LinkKey>>,
}

impl MemoryTargetRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record under a known id (test setup).
    pub fn seed(
        &self,
        tenant: TenantId,
        target_type: TargetType,
        id: Uuid,
        mut data: serde_json::Value,
    ) {
        if let Some(obj) = data.as_object_mut() {
            obj.insert("id".to_string(), serde_json::json!(id.to_string()));
        }
        self.records
            .lock()
            .unwrap()
            .entry((tenant, target_type))
            .or_default()
            .insert(id, data);
    }

    /// Whether a link exists (test inspection).
    pub fn has_link(
        &self,
        tenant: TenantId,
        from_type: TargetType,
        from_id: Uuid,
        to_type: TargetType,
        to_id: Uuid,
    ) -> bool {
        self.links
            .lock()
            .unwrap()
            .contains(&(tenant, from_type, from_id, to_type, to_id))
    }
}

#[async_trait]
impl TargetRepository for MemoryTargetRepository {
    async fn get(
        &self,
        tenant: TenantId,
        target_type: TargetType,
        id: Uuid,
    ) -> Result<Option<serde_json::Value>, LociError> {
        let records = self.records.lock().unwrap();
        Ok(records
            .get(&(tenant, target_type))
            .and_then(|m| m.get(&id))
            .cloned())
    }

    async fn create(
        &self,
        tenant: TenantId,
        target_type: TargetType,
        mut data: serde_json::Value,
    ) -> Result<serde_json::Value, LociError> {
        if !data.is_object() {
            return Err(LociError::Validation(
                "record data must be a JSON object".to_string(),
            ));
        }
        let id = Uuid::new_v4();
        data.as_object_mut()
            .expect("checked above")
            .insert("id".to_string(), serde_json::json!(id.to_string()));

        self.records
            .lock()
            .unwrap()
            .entry((tenant, target_type))
            .or_default()
            .insert(id, data.clone());
        Ok(data)
    }

    async fn update(
        &self,
        tenant: TenantId,
        target_type: TargetType,
        id: Uuid,
        patch: serde_json::Value,
    ) -> Result<serde_json::Value, LociError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(&(tenant, target_type))
            .and_then(|m| m.get_mut(&id))
            .ok_or_else(|| LociError::NotFound(format!("{} {}", target_type, id)))?;

        let (Some(obj), Some(patch_obj)) = (record.as_object_mut(), patch.as_object()) else {
            return Err(LociError::Validation(
                "update patch must be a JSON object".to_string(),
            ));
        };
        for (key, value) in patch_obj {
            obj.insert(key.clone(), value.clone());
        }
        Ok(record.clone())
    }

    async fn delete(
        &self,
        tenant: TenantId,
        target_type: TargetType,
        id: Uuid,
    ) -> Result<(), LociError> {
        let mut records = self.records.lock().unwrap();
        let removed = records
            .get_mut(&(tenant, target_type))
            .and_then(|m| m.remove(&id));
        if removed.is_none() {
            return Err(LociError::NotFound(format!("{} {}", target_type, id)));
        }
        Ok(())
    }

    async fn restore(
        &self,
        tenant: TenantId,
        target_type: TargetType,
        id: Uuid,
        mut data: serde_json::Value,
    ) -> Result<serde_json::Value, LociError> {
        if let Some(obj) = data.as_object_mut() {
            obj.insert("id".to_string(), serde_json::json!(id.to_string()));
        }
        self.records
            .lock()
            .unwrap()
            .entry((tenant, target_type))
            .or_default()
            .insert(id, data.clone());
        Ok(data)
    }

    async fn link(
        &self,
        tenant: TenantId,
        from_type: TargetType,
        from_id: Uuid,
        to_type: TargetType,
        to_id: Uuid,
    ) -> Result<(), LociError> {
        self.links
            .lock()
            .unwrap()
            .insert((tenant, from_type, from_id, to_type, to_id));
        Ok(())
    }

    async fn unlink(
        &self,
        tenant: TenantId,
        from_type: TargetType,
        from_id: Uuid,
        to_type: TargetType,
        to_id: Uuid,
    ) -> Result<(), LociError> {
        self.links
            .lock()
            .unwrap()
            .remove(&(tenant, from_type, from_id, to_type, to_id));
        Ok(())
    }
}

/// A delivered notification held by the in-memory notifier.
#[derive(Debug, Clone)]
pub struct DeliveredNotification {
    pub id: Uuid,
    pub tenant: TenantId,
    pub user: UserId,
    pub message: String,
    pub voided: bool,
}

/// A scheduled reminder held by the in-memory notifier.
#[derive(Debug, Clone)]
pub struct ScheduledReminder {
    pub id: Uuid,
    pub tenant: TenantId,
    pub user: UserId,
    pub message: String,
    pub at: Timestamp,
    pub cancelled: bool,
}

/// In-memory notifier for tests and single-process deployments.
#[derive(Default)]
pub struct MemoryNotifier {
    notifications: Mutex<Vec<DeliveredNotification>>,
    reminders: Mutex<Vec<ScheduledReminder>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<DeliveredNotification> {
        self.notifications.lock().unwrap().clone()
    }

    pub fn reminders(&self) -> Vec<ScheduledReminder> {
        self.reminders.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(
        &self,
        tenant: TenantId,
        user: UserId,
        message: &str,
    ) -> Result<Uuid, OutboundError> {
        let id = Uuid::new_v4();
        self.notifications.lock().unwrap().push(DeliveredNotification {
            id,
            tenant,
            user,
            message: message.to_string(),
            voided: false,
        });
        Ok(id)
    }

    async fn void_notification(&self, tenant: TenantId, id: Uuid) -> Result<(), OutboundError> {
        let mut notifications = self.notifications.lock().unwrap();
        match notifications
            .iter_mut()
            .find(|n| n.id == id && n.tenant == tenant)
        {
            Some(n) => {
                n.voided = true;
                Ok(())
            }
            None => Err(OutboundError::Other(format!("unknown notification {}", id))),
        }
    }

    async fn schedule_reminder(
        &self,
        tenant: TenantId,
        user: UserId,
        message: &str,
        at: Timestamp,
    ) -> Result<Uuid, OutboundError> {
        let id = Uuid::new_v4();
        self.reminders.lock().unwrap().push(ScheduledReminder {
            id,
            tenant,
            user,
            message: message.to_string(),
            at,
            cancelled: false,
        });
        Ok(id)
    }

    async fn cancel_reminder(&self, tenant: TenantId, id: Uuid) -> Result<(), OutboundError> {
        let mut reminders = self.reminders.lock().unwrap();
        match reminders.iter_mut().find(|r| r.id == id && r.tenant == tenant) {
            Some(r) => {
                r.cancelled = true;
                Ok(())
            }
            None => Err(OutboundError::Other(format!("unknown reminder {}", id))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tenant() -> TenantId {
        TenantId(Uuid::new_v4())
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_get_round_trips() {
        let repo = MemoryTargetRepository::new();
        let t = tenant();
        let record = repo
            .create(t, TargetType::Person, serde_json::json!({"name": "Ada"}))
            .await
            .unwrap();

        let id = Uuid::parse_str(record["id"].as_str().unwrap()).unwrap();
        let fetched = repo.get(t, TargetType::Person, id).await.unwrap().unwrap();
        assert_eq!(fetched["name"], "Ada");
    }

    #[tokio::test]
    async fn test_create_rejects_non_object() {
        let repo = MemoryTargetRepository::new();
        let result = repo
            .create(tenant(), TargetType::Person, serde_json::json!("not an object"))
            .await;
        assert!(matches!(result.unwrap_err(), LociError::Validation(_)));
    }

    #[tokio::test]
    async fn test_update_shallow_merges() {
        let repo = MemoryTargetRepository::new();
        let t = tenant();
        let id = Uuid::new_v4();
        repo.seed(
            t,
            TargetType::Admin,
            id,
            serde_json::json!({"status": "todo", "title": "file taxes"}),
        );

        let updated = repo
            .update(t, TargetType::Admin, id, serde_json::json!({"status": "done"}))
            .await
            .unwrap();
        assert_eq!(updated["status"], "done");
        assert_eq!(updated["title"], "file taxes");
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let repo = MemoryTargetRepository::new();
        let result = repo
            .update(
                tenant(),
                TargetType::Admin,
                Uuid::new_v4(),
                serde_json::json!({}),
            )
            .await;
        assert!(matches!(result.unwrap_err(), LociError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_and_restore_preserves_id() {
        let repo = MemoryTargetRepository::new();
        let t = tenant();
        let id = Uuid::new_v4();
        repo.seed(t, TargetType::Idea, id, serde_json::json!({"text": "memory palace"}));

        let snapshot = repo.get(t, TargetType::Idea, id).await.unwrap().unwrap();
        repo.delete(t, TargetType::Idea, id).await.unwrap();
        assert!(repo.get(t, TargetType::Idea, id).await.unwrap().is_none());

        repo.restore(t, TargetType::Idea, id, snapshot).await.unwrap();
        let restored = repo.get(t, TargetType::Idea, id).await.unwrap().unwrap();
        assert_eq!(restored["text"], "memory palace");
        assert_eq!(restored["id"], id.to_string());
    }

    #[tokio::test]
    async fn test_tenant_isolation() {
        let repo = MemoryTargetRepository::new();
        let (t1, t2) = (tenant(), tenant());
        let id = Uuid::new_v4();
        repo.seed(t1, TargetType::Project, id, serde_json::json!({"name": "X"}));

        assert!(repo.get(t2, TargetType::Project, id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_link_unlink() {
        let repo = MemoryTargetRepository::new();
        let t = tenant();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        repo.link(t, TargetType::Project, a, TargetType::Person, b)
            .await
            .unwrap();
        assert!(repo.has_link(t, TargetType::Project, a, TargetType::Person, b));

        repo.unlink(t, TargetType::Project, a, TargetType::Person, b)
            .await
            .unwrap();
        assert!(!repo.has_link(t, TargetType::Project, a, TargetType::Person, b));
    }

    #[tokio::test]
    async fn test_notifier_void_round_trip() {
        let notifier = MemoryNotifier::new();
        let t = tenant();
        let user = UserId(Uuid::new_v4());
        let id = notifier.notify(t, user, "plan fallback").await.unwrap();

        notifier.void_notification(t, id).await.unwrap();
        let delivered = notifier.notifications();
        assert_eq!(delivered.len(), 1);
        assert!(delivered[0].voided);
    }

    #[tokio::test]
    async fn test_notifier_void_unknown_id() {
        let notifier = MemoryNotifier::new();
        let result = notifier.void_notification(tenant(), Uuid::new_v4()).await;
        assert!(matches!(result.unwrap_err(), OutboundError::Other(_)));
    }

    #[tokio::test]
    async fn test_reminder_cancel_round_trip() {
        let notifier = MemoryNotifier::new();
        let t = tenant();
        let user = UserId(Uuid::new_v4());
        let id = notifier
            .schedule_reminder(t, user, "water the plants", Timestamp(1_700_000_000))
            .await
            .unwrap();

        notifier.cancel_reminder(t, id).await.unwrap();
        let reminders = notifier.reminders();
        assert_eq!(reminders.len(), 1);
        assert!(reminders[0].cancelled);
    }
}
