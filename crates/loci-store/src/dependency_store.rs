//! Persistence for task-dependency edges.
//!
//! The cycle check itself lives in `loci-graph`; this store only holds
//! the raw edges. An insert happens strictly after the graph has vetted
//! the edge, so a rejected edge never touches the table.

use std::sync::Arc;

use uuid::Uuid;

use loci_core::error::LociError;
use loci_core::types::{DependencyKind, TaskDependency, TenantId, Timestamp};

use crate::db::Database;

/// SQLite-backed store for task-dependency edges.
pub struct DependencyStore {
    db: Arc<Database>,
}

impl DependencyStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert an edge. A duplicate (task, depends_on) pair is an error.
    pub fn insert(&self, tenant: TenantId, edge: &TaskDependency) -> Result<(), LociError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO task_dependencies
                 (tenant_id, task_id, depends_on_task_id, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    tenant.to_string(),
                    edge.task_id.to_string(),
                    edge.depends_on_task_id.to_string(),
                    edge.kind.to_string(),
                    edge.created_at.0,
                ],
            )
            .map_err(|e| LociError::Storage(format!("Failed to insert dependency: {}", e)))?;
            Ok(())
        })
    }

    /// Remove an edge. Returns false when it does not exist.
    pub fn delete(
        &self,
        tenant: TenantId,
        task_id: Uuid,
        depends_on_task_id: Uuid,
    ) -> Result<bool, LociError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "DELETE FROM task_dependencies
                     WHERE tenant_id = ?1 AND task_id = ?2 AND depends_on_task_id = ?3",
                    rusqlite::params![
                        tenant.to_string(),
                        task_id.to_string(),
                        depends_on_task_id.to_string()
                    ],
                )
                .map_err(|e| LociError::Storage(format!("Dependency delete: {}", e)))?;
            Ok(changed > 0)
        })
    }

    /// All edges for a tenant.
    pub fn list(&self, tenant: TenantId) -> Result<Vec<TaskDependency>, LociError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT task_id, depends_on_task_id, kind, created_at
                     FROM task_dependencies WHERE tenant_id = ?1",
                )
                .map_err(|e| LociError::Storage(format!("Dependency list prepare: {}", e)))?;
            let rows = stmt
                .query_map(rusqlite::params![tenant.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })
                .map_err(|e| LociError::Storage(format!("Dependency list query: {}", e)))?;

            let mut edges = Vec::new();
            for row in rows {
                let (task_id, depends_on, kind, created_at) =
                    row.map_err(|e| LociError::Storage(e.to_string()))?;
                edges.push(TaskDependency {
                    task_id: parse_uuid(&task_id)?,
                    depends_on_task_id: parse_uuid(&depends_on)?,
                    kind: kind.parse::<DependencyKind>().map_err(LociError::Storage)?,
                    created_at: Timestamp(created_at),
                });
            }
            Ok(edges)
        })
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, LociError> {
    Uuid::parse_str(raw).map_err(|e| LociError::Storage(format!("Bad uuid {:?}: {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> DependencyStore {
        DependencyStore::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn edge(task: Uuid, depends_on: Uuid) -> TaskDependency {
        TaskDependency {
            task_id: task,
            depends_on_task_id: depends_on,
            kind: DependencyKind::BlockedBy,
            created_at: Timestamp::now(),
        }
    }

    #[test]
    fn test_insert_list_round_trip() {
        let store = store();
        let tenant = TenantId(Uuid::new_v4());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.insert(tenant, &edge(a, b)).unwrap();

        let edges = store.list(tenant).unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].task_id, a);
        assert_eq!(edges[0].depends_on_task_id, b);
        assert_eq!(edges[0].kind, DependencyKind::BlockedBy);
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let store = store();
        let tenant = TenantId(Uuid::new_v4());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.insert(tenant, &edge(a, b)).unwrap();
        assert!(store.insert(tenant, &edge(a, b)).is_err());
    }

    #[test]
    fn test_delete() {
        let store = store();
        let tenant = TenantId(Uuid::new_v4());
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.insert(tenant, &edge(a, b)).unwrap();

        assert!(store.delete(tenant, a, b).unwrap());
        assert!(!store.delete(tenant, a, b).unwrap());
        assert!(store.list(tenant).unwrap().is_empty());
    }

    #[test]
    fn test_list_scoped_to_tenant() {
        let store = store();
        let tenant = TenantId(Uuid::new_v4());
        let other = TenantId(Uuid::new_v4());
        store
            .insert(tenant, &edge(Uuid::new_v4(), Uuid::new_v4()))
            .unwrap();

        assert!(store.list(other).unwrap().is_empty());
    }
}
