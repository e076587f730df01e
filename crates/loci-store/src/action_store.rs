//! Persistence for actions and their audit history.
//!
//! Status changes are compare-and-swap UPDATE statements guarded by the
//! expected prior status, so a concurrent approve/reject/execute of the
//! same action can never double-apply. The execution claim is the
//! `executed_at` column: it is set exactly once, by whichever request
//! wins the CAS.

use std::sync::Arc;

use rusqlite::OptionalExtension;
use uuid::Uuid;

use loci_core::error::LociError;
use loci_core::types::{
    Action, ActionHistoryRecord, ActionStatus, ActionType, TenantId, Timestamp, UserId,
};

use crate::db::Database;

/// Filter for listing actions.
#[derive(Debug, Clone, Default)]
pub struct ActionFilter {
    pub status: Option<ActionStatus>,
    pub action_type: Option<ActionType>,
    pub limit: Option<u32>,
}

/// SQLite-backed store for actions.
pub struct ActionStore {
    db: Arc<Database>,
}

impl ActionStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persist a freshly created action.
    pub fn insert(&self, action: &Action) -> Result<(), LociError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO actions
                 (id, tenant_id, user_id, action_type, target_type, target_id,
                  parameters, requires_approval, status, approved_by, approved_at,
                  executed_at, rolled_back_at, prior_state, result, error, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                rusqlite::params![
                    action.id.to_string(),
                    action.tenant_id.to_string(),
                    action.user_id.to_string(),
                    action.action_type.to_string(),
                    action.target_type.to_string(),
                    action.target_id.map(|id| id.to_string()),
                    action.parameters.to_string(),
                    action.requires_approval as i32,
                    action.status.to_string(),
                    action.approved_by.map(|u| u.to_string()),
                    action.approved_at.map(|t| t.0),
                    action.executed_at.map(|t| t.0),
                    action.rolled_back_at.map(|t| t.0),
                    action.prior_state.as_ref().map(|v| v.to_string()),
                    action.result.as_ref().map(|v| v.to_string()),
                    action.error,
                    action.created_at.0,
                ],
            )
            .map_err(|e| LociError::Storage(format!("Failed to insert action: {}", e)))?;
            Ok(())
        })
    }

    /// Fetch an action by id within a tenant.
    pub fn get(&self, tenant: TenantId, id: Uuid) -> Result<Option<Action>, LociError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    &format!("SELECT {} FROM actions WHERE id = ?1 AND tenant_id = ?2", COLUMNS),
                    rusqlite::params![id.to_string(), tenant.to_string()],
                    |row| Ok(row_to_action(row)),
                )
                .optional()
                .map_err(|e| LociError::Storage(format!("Action query: {}", e)))?;

            match result {
                Some(action) => Ok(Some(action?)),
                None => Ok(None),
            }
        })
    }

    /// List actions for a tenant, newest first, with optional filters.
    pub fn list(&self, tenant: TenantId, filter: &ActionFilter) -> Result<Vec<Action>, LociError> {
        self.db.with_conn(|conn| {
            let mut sql = format!(
                "SELECT {} FROM actions WHERE tenant_id = ?1",
                COLUMNS
            );
            let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> =
                vec![Box::new(tenant.to_string())];

            if let Some(status) = filter.status {
                params_vec.push(Box::new(status.to_string()));
                sql.push_str(&format!(" AND status = ?{}", params_vec.len()));
            }
            if let Some(action_type) = filter.action_type {
                params_vec.push(Box::new(action_type.to_string()));
                sql.push_str(&format!(" AND action_type = ?{}", params_vec.len()));
            }

            sql.push_str(" ORDER BY created_at DESC, id ASC");

            if let Some(limit) = filter.limit {
                params_vec.push(Box::new(limit as i64));
                sql.push_str(&format!(" LIMIT ?{}", params_vec.len()));
            }

            let params_refs: Vec<&dyn rusqlite::types::ToSql> =
                params_vec.iter().map(|p| p.as_ref()).collect();

            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| LociError::Storage(format!("Action list prepare: {}", e)))?;
            let rows = stmt
                .query_map(params_refs.as_slice(), |row| Ok(row_to_action(row)))
                .map_err(|e| LociError::Storage(format!("Action list query: {}", e)))?;

            let mut actions = Vec::new();
            for row in rows {
                let action = row.map_err(|e| LociError::Storage(e.to_string()))??;
                actions.push(action);
            }
            Ok(actions)
        })
    }

    /// CAS `pending -> approved`. Returns false if the action was not pending.
    pub fn approve(
        &self,
        tenant: TenantId,
        id: Uuid,
        approver: UserId,
        now: Timestamp,
    ) -> Result<bool, LociError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE actions
                     SET status = 'approved', approved_by = ?1, approved_at = ?2
                     WHERE id = ?3 AND tenant_id = ?4 AND status = 'pending'",
                    rusqlite::params![
                        approver.to_string(),
                        now.0,
                        id.to_string(),
                        tenant.to_string()
                    ],
                )
                .map_err(|e| LociError::Storage(format!("Approve CAS: {}", e)))?;
            Ok(changed > 0)
        })
    }

    /// CAS `pending -> rejected`. Returns false if the action was not pending.
    pub fn reject(
        &self,
        tenant: TenantId,
        id: Uuid,
        reason: &str,
    ) -> Result<bool, LociError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE actions
                     SET status = 'rejected', error = ?1
                     WHERE id = ?2 AND tenant_id = ?3 AND status = 'pending'",
                    rusqlite::params![reason, id.to_string(), tenant.to_string()],
                )
                .map_err(|e| LociError::Storage(format!("Reject CAS: {}", e)))?;
            Ok(changed > 0)
        })
    }

    /// Claim execution of an approved action.
    ///
    /// Sets `executed_at` exactly once; a concurrent second caller loses
    /// the CAS and must return the recorded outcome instead of
    /// re-mutating. The status stays `approved` until the mutation
    /// settles into `executed` or `failed`.
    pub fn claim_execution(
        &self,
        tenant: TenantId,
        id: Uuid,
        now: Timestamp,
    ) -> Result<bool, LociError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE actions
                     SET executed_at = ?1
                     WHERE id = ?2 AND tenant_id = ?3
                       AND status = 'approved' AND executed_at IS NULL",
                    rusqlite::params![now.0, id.to_string(), tenant.to_string()],
                )
                .map_err(|e| LociError::Storage(format!("Execution claim CAS: {}", e)))?;
            Ok(changed > 0)
        })
    }

    /// Settle a claimed execution as successful: `approved -> executed`.
    pub fn record_result(
        &self,
        tenant: TenantId,
        id: Uuid,
        prior_state: Option<&serde_json::Value>,
        result: &serde_json::Value,
    ) -> Result<(), LociError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE actions
                 SET status = 'executed', prior_state = ?1, result = ?2, error = NULL
                 WHERE id = ?3 AND tenant_id = ?4",
                rusqlite::params![
                    prior_state.map(|v| v.to_string()),
                    result.to_string(),
                    id.to_string(),
                    tenant.to_string()
                ],
            )
            .map_err(|e| LociError::Storage(format!("Record result: {}", e)))?;
            Ok(())
        })
    }

    /// Settle a claimed execution as failed: `approved -> failed`.
    ///
    /// No prior state is retained, so a failed action is never eligible
    /// for rollback.
    pub fn record_failure(
        &self,
        tenant: TenantId,
        id: Uuid,
        error: &str,
    ) -> Result<(), LociError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE actions
                 SET status = 'failed', error = ?1, prior_state = NULL, result = NULL
                 WHERE id = ?2 AND tenant_id = ?3",
                rusqlite::params![error, id.to_string(), tenant.to_string()],
            )
            .map_err(|e| LociError::Storage(format!("Record failure: {}", e)))?;
            Ok(())
        })
    }

    /// CAS `executed -> rolled_back`. Returns false if the action was not
    /// executed (e.g., already rolled back by a concurrent request).
    pub fn mark_rolled_back(
        &self,
        tenant: TenantId,
        id: Uuid,
        now: Timestamp,
    ) -> Result<bool, LociError> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE actions
                     SET status = 'rolled_back', rolled_back_at = ?1
                     WHERE id = ?2 AND tenant_id = ?3 AND status = 'executed'",
                    rusqlite::params![now.0, id.to_string(), tenant.to_string()],
                )
                .map_err(|e| LociError::Storage(format!("Rollback CAS: {}", e)))?;
            Ok(changed > 0)
        })
    }

    /// Ids of pending actions created before `cutoff`.
    pub fn stale_pending(
        &self,
        tenant: TenantId,
        cutoff: Timestamp,
    ) -> Result<Vec<Uuid>, LociError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id FROM actions
                     WHERE tenant_id = ?1 AND status = 'pending' AND created_at < ?2",
                )
                .map_err(|e| LociError::Storage(format!("Stale query prepare: {}", e)))?;
            let rows = stmt
                .query_map(
                    rusqlite::params![tenant.to_string(), cutoff.0],
                    |row| row.get::<_, String>(0),
                )
                .map_err(|e| LociError::Storage(format!("Stale query: {}", e)))?;

            let mut ids = Vec::new();
            for row in rows {
                let raw = row.map_err(|e| LociError::Storage(e.to_string()))?;
                ids.push(parse_uuid(&raw)?);
            }
            Ok(ids)
        })
    }

    /// Append an audit record.
    pub fn append_history(&self, record: &ActionHistoryRecord) -> Result<(), LociError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO action_history
                 (id, action_id, action_type, outcome, error, recorded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    record.id.to_string(),
                    record.action_id.to_string(),
                    record.action_type.to_string(),
                    record.outcome,
                    record.error,
                    record.recorded_at.0,
                ],
            )
            .map_err(|e| LociError::Storage(format!("Failed to insert history: {}", e)))?;
            Ok(())
        })
    }

    /// Audit records for an action, newest first.
    pub fn history(&self, action_id: Uuid) -> Result<Vec<ActionHistoryRecord>, LociError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, action_id, action_type, outcome, error, recorded_at
                     FROM action_history
                     WHERE action_id = ?1
                     ORDER BY recorded_at DESC",
                )
                .map_err(|e| LociError::Storage(format!("History prepare: {}", e)))?;
            let rows = stmt
                .query_map(rusqlite::params![action_id.to_string()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, i64>(5)?,
                    ))
                })
                .map_err(|e| LociError::Storage(format!("History query: {}", e)))?;

            let mut records = Vec::new();
            for row in rows {
                let (id, action_id, action_type, outcome, error, recorded_at) =
                    row.map_err(|e| LociError::Storage(e.to_string()))?;
                records.push(ActionHistoryRecord {
                    id: parse_uuid(&id)?,
                    action_id: parse_uuid(&action_id)?,
                    action_type: action_type
                        .parse()
                        .map_err(LociError::Storage)?,
                    outcome,
                    error,
                    recorded_at: Timestamp(recorded_at),
                });
            }
            Ok(records)
        })
    }
}

const COLUMNS: &str = "id, tenant_id, user_id, action_type, target_type, target_id, \
                       parameters, requires_approval, status, approved_by, approved_at, \
                       executed_at, rolled_back_at, prior_state, result, error, created_at";

fn parse_uuid(raw: &str) -> Result<Uuid, LociError> {
    Uuid::parse_str(raw).map_err(|e| LociError::Storage(format!("Bad uuid {:?}: {}", raw, e)))
}

fn parse_json(raw: Option<String>) -> Result<Option<serde_json::Value>, LociError> {
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

fn row_to_action(row: &rusqlite::Row<'_>) -> Result<Action, LociError> {
    let id: String = row.get(0).map_err(|e| LociError::Storage(e.to_string()))?;
    let tenant_id: String = row.get(1).map_err(|e| LociError::Storage(e.to_string()))?;
    let user_id: String = row.get(2).map_err(|e| LociError::Storage(e.to_string()))?;
    let action_type: String = row.get(3).map_err(|e| LociError::Storage(e.to_string()))?;
    let target_type: String = row.get(4).map_err(|e| LociError::Storage(e.to_string()))?;
    let target_id: Option<String> = row.get(5).map_err(|e| LociError::Storage(e.to_string()))?;
    let parameters: String = row.get(6).map_err(|e| LociError::Storage(e.to_string()))?;
    let requires_approval: i64 = row.get(7).map_err(|e| LociError::Storage(e.to_string()))?;
    let status: String = row.get(8).map_err(|e| LociError::Storage(e.to_string()))?;
    let approved_by: Option<String> = row.get(9).map_err(|e| LociError::Storage(e.to_string()))?;
    let approved_at: Option<i64> = row.get(10).map_err(|e| LociError::Storage(e.to_string()))?;
    let executed_at: Option<i64> = row.get(11).map_err(|e| LociError::Storage(e.to_string()))?;
    let rolled_back_at: Option<i64> =
        row.get(12).map_err(|e| LociError::Storage(e.to_string()))?;
    let prior_state: Option<String> =
        row.get(13).map_err(|e| LociError::Storage(e.to_string()))?;
    let result: Option<String> = row.get(14).map_err(|e| LociError::Storage(e.to_string()))?;
    let error: Option<String> = row.get(15).map_err(|e| LociError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(16).map_err(|e| LociError::Storage(e.to_string()))?;

    Ok(Action {
        id: parse_uuid(&id)?,
        tenant_id: TenantId(parse_uuid(&tenant_id)?),
        user_id: UserId(parse_uuid(&user_id)?),
        action_type: action_type.parse().map_err(LociError::Storage)?,
        target_type: target_type.parse().map_err(LociError::Storage)?,
        target_id: target_id.as_deref().map(parse_uuid).transpose()?,
        parameters: serde_json::from_str(&parameters)?,
        requires_approval: requires_approval != 0,
        status: status.parse().map_err(LociError::Storage)?,
        approved_by: approved_by
            .as_deref()
            .map(parse_uuid)
            .transpose()?
            .map(UserId),
        approved_at: approved_at.map(Timestamp),
        executed_at: executed_at.map(Timestamp),
        rolled_back_at: rolled_back_at.map(Timestamp),
        prior_state: parse_json(prior_state)?,
        result: parse_json(result)?,
        error,
        created_at: Timestamp(created_at),
    })
}
