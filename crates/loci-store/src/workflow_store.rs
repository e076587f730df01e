//! Persistence for workflow automation rules.
//!
//! Trigger and action-template documents are stored as JSON columns; the
//! engine only ever needs them whole.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use uuid::Uuid;

use loci_core::error::LociError;
use loci_core::types::{TenantId, Timestamp, UserId, Workflow, WorkflowPatch};

use crate::db::Database;

/// SQLite-backed store for workflows.
pub struct WorkflowStore {
    db: Arc<Database>,
}

impl WorkflowStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn insert(&self, workflow: &Workflow) -> Result<(), LociError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO workflows
                 (id, tenant_id, created_by, name, trigger, actions, priority, enabled,
                  last_run_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                rusqlite::params![
                    workflow.id.to_string(),
                    workflow.tenant_id.to_string(),
                    workflow.created_by.to_string(),
                    workflow.name,
                    serde_json::to_string(&workflow.trigger)?,
                    serde_json::to_string(&workflow.actions)?,
                    workflow.priority,
                    workflow.enabled as i32,
                    workflow.last_run_at.map(|t| t.0),
                    workflow.created_at.0,
                ],
            )
            .map_err(|e| LociError::Storage(format!("Failed to insert workflow: {}", e)))?;
            Ok(())
        })
    }

    pub fn get(&self, tenant: TenantId, id: Uuid) -> Result<Option<Workflow>, LociError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    "SELECT id, tenant_id, created_by, name, trigger, actions, priority,
                            enabled, last_run_at, created_at
                     FROM workflows WHERE id = ?1 AND tenant_id = ?2",
                    rusqlite::params![id.to_string(), tenant.to_string()],
                    |row| Ok(row_to_workflow(row)),
                )
                .optional()
                .map_err(|e| LociError::Storage(format!("Workflow query: {}", e)))?;

            match result {
                Some(workflow) => Ok(Some(workflow?)),
                None => Ok(None),
            }
        })
    }

    /// Apply a partial update. Absent patch fields leave the stored value
    /// untouched. Returns the updated workflow, or None if it does not
    /// exist.
    pub fn update(
        &self,
        tenant: TenantId,
        id: Uuid,
        patch: &WorkflowPatch,
    ) -> Result<Option<Workflow>, LociError> {
        // Read-modify-write under the connection mutex.
        let Some(mut workflow) = self.get(tenant, id)? else {
            return Ok(None);
        };
        patch.apply_to(&mut workflow);

        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE workflows
                 SET name = ?1, trigger = ?2, actions = ?3, priority = ?4, enabled = ?5
                 WHERE id = ?6 AND tenant_id = ?7",
                rusqlite::params![
                    workflow.name,
                    serde_json::to_string(&workflow.trigger)?,
                    serde_json::to_string(&workflow.actions)?,
                    workflow.priority,
                    workflow.enabled as i32,
                    id.to_string(),
                    tenant.to_string(),
                ],
            )
            .map_err(|e| LociError::Storage(format!("Workflow update: {}", e)))?;
            Ok(())
        })?;

        Ok(Some(workflow))
    }

    /// Delete a workflow. Returns false when it does not exist.
    pub fn delete(&self, tenant: TenantId, id: Uuid) -> Result<bool, LociError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "DELETE FROM workflows WHERE id = ?1 AND tenant_id = ?2",
                    rusqlite::params![id.to_string(), tenant.to_string()],
                )
                .map_err(|e| LociError::Storage(format!("Workflow delete: {}", e)))?;
            Ok(changed > 0)
        })
    }

    /// List workflows for a tenant in evaluation order: priority
    /// descending, ties broken by id ascending.
    pub fn list(&self, tenant: TenantId, enabled_only: bool) -> Result<Vec<Workflow>, LociError> {
        self.db.with_conn(|conn| {
            let sql = if enabled_only {
                "SELECT id, tenant_id, created_by, name, trigger, actions, priority,
                        enabled, last_run_at, created_at
                 FROM workflows WHERE tenant_id = ?1 AND enabled = 1
                 ORDER BY priority DESC, id ASC"
            } else {
                "SELECT id, tenant_id, created_by, name, trigger, actions, priority,
                        enabled, last_run_at, created_at
                 FROM workflows WHERE tenant_id = ?1
                 ORDER BY priority DESC, id ASC"
            };

            let mut stmt = conn
                .prepare(sql)
                .map_err(|e| LociError::Storage(format!("Workflow list prepare: {}", e)))?;
            let rows = stmt
                .query_map(rusqlite::params![tenant.to_string()], |row| {
                    Ok(row_to_workflow(row))
                })
                .map_err(|e| LociError::Storage(format!("Workflow list query: {}", e)))?;

            let mut workflows = Vec::new();
            for row in rows {
                workflows.push(row.map_err(|e| LociError::Storage(e.to_string()))??);
            }
            Ok(workflows)
        })
    }

    /// Stamp the last evaluation time.
    pub fn mark_ran(&self, tenant: TenantId, id: Uuid, now: Timestamp) -> Result<(), LociError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE workflows SET last_run_at = ?1 WHERE id = ?2 AND tenant_id = ?3",
                rusqlite::params![now.0, id.to_string(), tenant.to_string()],
            )
            .map_err(|e| LociError::Storage(format!("Workflow mark_ran: {}", e)))?;
            Ok(())
        })
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, LociError> {
    Uuid::parse_str(raw).map_err(|e| LociError::Storage(format!("Bad uuid {:?}: {}", raw, e)))
}

fn row_to_workflow(row: &rusqlite::Row<'_>) -> Result<Workflow, LociError> {
    let id: String = row.get(0).map_err(|e| LociError::Storage(e.to_string()))?;
    let tenant_id: String = row.get(1).map_err(|e| LociError::Storage(e.to_string()))?;
    let created_by: String = row.get(2).map_err(|e| LociError::Storage(e.to_string()))?;
    let name: String = row.get(3).map_err(|e| LociError::Storage(e.to_string()))?;
    let trigger: String = row.get(4).map_err(|e| LociError::Storage(e.to_string()))?;
    let actions: String = row.get(5).map_err(|e| LociError::Storage(e.to_string()))?;
    let priority: i32 = row.get(6).map_err(|e| LociError::Storage(e.to_string()))?;
    let enabled: i64 = row.get(7).map_err(|e| LociError::Storage(e.to_string()))?;
    let last_run_at: Option<i64> = row.get(8).map_err(|e| LociError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(9).map_err(|e| LociError::Storage(e.to_string()))?;

    Ok(Workflow {
        id: parse_uuid(&id)?,
        tenant_id: TenantId(parse_uuid(&tenant_id)?),
        created_by: UserId(parse_uuid(&created_by)?),
        name,
        trigger: serde_json::from_str(&trigger)?,
        actions: serde_json::from_str(&actions)?,
        priority,
        enabled: enabled != 0,
        last_run_at: last_run_at.map(Timestamp),
        created_at: Timestamp(created_at),
    })
}
