//! Persistence for plans and their steps.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use uuid::Uuid;

use loci_core::error::LociError;
use loci_core::types::{Plan, PlanStatus, PlanStep, StepStatus, TenantId, Timestamp, UserId};

use crate::db::Database;

/// SQLite-backed store for plans.
pub struct PlanStore {
    db: Arc<Database>,
}

impl PlanStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persist a plan and all of its steps.
    pub fn insert(&self, plan: &Plan) -> Result<(), LociError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO plans
                 (id, tenant_id, user_id, name, description, request, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    plan.id.to_string(),
                    plan.tenant_id.to_string(),
                    plan.user_id.to_string(),
                    plan.name,
                    plan.description,
                    plan.request,
                    plan.status.to_string(),
                    plan.created_at.0,
                ],
            )
            .map_err(|e| LociError::Storage(format!("Failed to insert plan: {}", e)))?;

            for step in &plan.steps {
                conn.execute(
                    "INSERT INTO plan_steps
                     (plan_id, step_order, action_type, target_type, target_id,
                      action_params, dependencies, description, status, error)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    rusqlite::params![
                        plan.id.to_string(),
                        step.step_order,
                        step.action_type.to_string(),
                        step.target_type.to_string(),
                        step.target_id.map(|id| id.to_string()),
                        step.action_params.to_string(),
                        serde_json::to_string(&step.dependencies)?,
                        step.description,
                        step.status.to_string(),
                        step.error,
                    ],
                )
                .map_err(|e| LociError::Storage(format!("Failed to insert step: {}", e)))?;
            }
            Ok(())
        })
    }

    /// Fetch a plan with its steps ordered by `step_order`.
    pub fn get(&self, tenant: TenantId, id: Uuid) -> Result<Option<Plan>, LociError> {
        self.db.with_conn(|conn| {
            let header = conn
                .query_row(
                    "SELECT id, tenant_id, user_id, name, description, request, status, created_at
                     FROM plans WHERE id = ?1 AND tenant_id = ?2",
                    rusqlite::params![id.to_string(), tenant.to_string()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, String>(5)?,
                            row.get::<_, String>(6)?,
                            row.get::<_, i64>(7)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| LociError::Storage(format!("Plan query: {}", e)))?;

            let Some((id_raw, tenant_raw, user_raw, name, description, request, status, created_at)) =
                header
            else {
                return Ok(None);
            };

            let mut stmt = conn
                .prepare(
                    "SELECT step_order, action_type, target_type, target_id,
                            action_params, dependencies, description, status, error
                     FROM plan_steps WHERE plan_id = ?1
                     ORDER BY step_order ASC",
                )
                .map_err(|e| LociError::Storage(format!("Step query prepare: {}", e)))?;
            let rows = stmt
                .query_map(rusqlite::params![id_raw], |row| Ok(row_to_step(row)))
                .map_err(|e| LociError::Storage(format!("Step query: {}", e)))?;

            let mut steps = Vec::new();
            for row in rows {
                steps.push(row.map_err(|e| LociError::Storage(e.to_string()))??);
            }

            Ok(Some(Plan {
                id: parse_uuid(&id_raw)?,
                tenant_id: TenantId(parse_uuid(&tenant_raw)?),
                user_id: UserId(parse_uuid(&user_raw)?),
                name,
                description,
                request,
                steps,
                status: status.parse().map_err(LociError::Storage)?,
                created_at: Timestamp(created_at),
            }))
        })
    }

    /// List plan ids for a tenant, newest first.
    pub fn list_ids(&self, tenant: TenantId, limit: Option<u32>) -> Result<Vec<Uuid>, LociError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id FROM plans WHERE tenant_id = ?1
                     ORDER BY created_at DESC, id ASC LIMIT ?2",
                )
                .map_err(|e| LociError::Storage(format!("Plan list prepare: {}", e)))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![tenant.to_string(), limit.unwrap_or(u32::MAX) as i64],
                    |row| row.get::<_, String>(0),
                )
                .map_err(|e| LociError::Storage(format!("Plan list query: {}", e)))?;

            let mut ids = Vec::new();
            for row in rows {
                ids.push(parse_uuid(&row.map_err(|e| LociError::Storage(e.to_string()))?)?);
            }
            Ok(ids)
        })
    }

    /// Update a plan's status. Returns false when the plan does not exist.
    pub fn update_status(
        &self,
        tenant: TenantId,
        id: Uuid,
        status: PlanStatus,
    ) -> Result<bool, LociError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE plans SET status = ?1 WHERE id = ?2 AND tenant_id = ?3",
                    rusqlite::params![status.to_string(), id.to_string(), tenant.to_string()],
                )
                .map_err(|e| LociError::Storage(format!("Plan status update: {}", e)))?;
            Ok(changed > 0)
        })
    }

    /// Update one step's status and error as execution progresses.
    pub fn update_step(
        &self,
        plan_id: Uuid,
        step_order: u32,
        status: StepStatus,
        error: Option<&str>,
    ) -> Result<bool, LociError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE plan_steps SET status = ?1, error = ?2
                     WHERE plan_id = ?3 AND step_order = ?4",
                    rusqlite::params![
                        status.to_string(),
                        error,
                        plan_id.to_string(),
                        step_order
                    ],
                )
                .map_err(|e| LociError::Storage(format!("Step update: {}", e)))?;
            Ok(changed > 0)
        })
    }
}

fn parse_uuid(raw: &str) -> Result<Uuid, LociError> {
    Uuid::parse_str(raw).map_err(|e| LociError::Storage(format!("Bad uuid {:?}: {}", raw, e)))
}

fn row_to_step(row: &rusqlite::Row<'_>) -> Result<PlanStep, LociError> {
    let step_order: u32 = row.get(0).map_err(|e| LociError::Storage(e.to_string()))?;
    let action_type: String = row.get(1).map_err(|e| LociError::Storage(e.to_string()))?;
    let target_type: String = row.get(2).map_err(|e| LociError::Storage(e.to_string()))?;
    let target_id: Option<String> = row.get(3).map_err(|e| LociError::Storage(e.to_string()))?;
    let action_params: String = row.get(4).map_err(|e| LociError::Storage(e.to_string()))?;
    let dependencies: String = row.get(5).map_err(|e| LociError::Storage(e.to_string()))?;
    let description: String = row.get(6).map_err(|e| LociError::Storage(e.to_string()))?;
    let status: String = row.get(7).map_err(|e| LociError::Storage(e.to_string()))?;
    let error: Option<String> = row.get(8).map_err(|e| LociError::Storage(e.to_string()))?;

    Ok(PlanStep {
        step_order,
        action_type: action_type.parse().map_err(LociError::Storage)?,
        target_type: target_type.parse().map_err(LociError::Storage)?,
        target_id: target_id.as_deref().map(parse_uuid).transpose()?,
        action_params: serde_json::from_str(&action_params)?,
        dependencies: serde_json::from_str(&dependencies)?,
        description,
        status: status.parse().map_err(LociError::Storage)?,
        error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use loci_core::types::{ActionType, TargetType};

    fn store() -> PlanStore {
        PlanStore::new(Arc::new(Database::in_memory().unwrap()))
    }

    fn sample_plan(tenant: TenantId) -> Plan {
        let step = |order: u32, deps: Vec<u32>| PlanStep {
            step_order: order,
            action_type: ActionType::Create,
            target_type: TargetType::Project,
            target_id: None,
            action_params: serde_json::json!({"name": format!("step {}", order)}),
            dependencies: deps,
            description: format!("step {}", order),
            status: StepStatus::Pending,
            error: None,
        };
        Plan {
            id: Uuid::new_v4(),
            tenant_id: tenant,
            user_id: UserId(Uuid::new_v4()),
            name: "Launch".to_string(),
            description: Some("two-step launch".to_string()),
            request: "create project X and link person Y".to_string(),
            steps: vec![step(1, vec![]), step(2, vec![1])],
            status: PlanStatus::Pending,
            created_at: Timestamp::now(),
        }
    }

    #[test]
    fn test_insert_and_get_round_trip() {
        let store = store();
        let tenant = TenantId(Uuid::new_v4());
        let plan = sample_plan(tenant);
        store.insert(&plan).unwrap();

        let fetched = store.get(tenant, plan.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Launch");
        assert_eq!(fetched.steps.len(), 2);
        assert_eq!(fetched.steps[0].step_order, 1);
        assert_eq!(fetched.steps[1].dependencies, vec![1]);
        assert_eq!(fetched.status, PlanStatus::Pending);
    }

    #[test]
    fn test_get_missing_plan() {
        let store = store();
        let tenant = TenantId(Uuid::new_v4());
        assert!(store.get(tenant, Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_get_scoped_to_tenant() {
        let store = store();
        let tenant = TenantId(Uuid::new_v4());
        let plan = sample_plan(tenant);
        store.insert(&plan).unwrap();

        assert!(store.get(TenantId(Uuid::new_v4()), plan.id).unwrap().is_none());
    }

    #[test]
    fn test_update_status() {
        let store = store();
        let tenant = TenantId(Uuid::new_v4());
        let plan = sample_plan(tenant);
        store.insert(&plan).unwrap();

        assert!(store.update_status(tenant, plan.id, PlanStatus::Running).unwrap());
        let fetched = store.get(tenant, plan.id).unwrap().unwrap();
        assert_eq!(fetched.status, PlanStatus::Running);

        assert!(!store.update_status(tenant, Uuid::new_v4(), PlanStatus::Failed).unwrap());
    }

    #[test]
    fn test_update_step() {
        let store = store();
        let tenant = TenantId(Uuid::new_v4());
        let plan = sample_plan(tenant);
        store.insert(&plan).unwrap();

        assert!(store
            .update_step(plan.id, 2, StepStatus::Failed, Some("target missing"))
            .unwrap());

        let fetched = store.get(tenant, plan.id).unwrap().unwrap();
        assert_eq!(fetched.steps[1].status, StepStatus::Failed);
        assert_eq!(fetched.steps[1].error.as_deref(), Some("target missing"));
        assert_eq!(fetched.steps[0].status, StepStatus::Pending);
    }

    #[test]
    fn test_list_ids() {
        let store = store();
        let tenant = TenantId(Uuid::new_v4());
        let a = sample_plan(tenant);
        let b = sample_plan(tenant);
        store.insert(&a).unwrap();
        store.insert(&b).unwrap();

        let ids = store.list_ids(tenant, None).unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&a.id));
        assert!(ids.contains(&b.id));
    }
}
