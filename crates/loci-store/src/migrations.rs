//! Database schema migrations.
//!
//! Applies the initial schema: actions, action_history, plans,
//! plan_steps, workflows, task_dependencies, and the migrations
//! tracking table.

use rusqlite::Connection;
use tracing::info;

use loci_core::error::LociError;

/// Run all pending database migrations.
///
/// Currently implements the initial schema (version 1). Future migrations
/// can be added by checking the current version and applying incremental
/// changes.
pub fn run_migrations(conn: &Connection) -> Result<(), LociError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| LociError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| LociError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<(), LociError> {
    conn.execute_batch(
        "
        -- Gated mutations and their approval/execution bookkeeping.
        CREATE TABLE IF NOT EXISTS actions (
            id                  TEXT PRIMARY KEY NOT NULL,
            tenant_id           TEXT NOT NULL,
            user_id             TEXT NOT NULL,
            action_type         TEXT NOT NULL
                                CHECK (action_type IN
                                ('create', 'update', 'delete', 'link', 'notify', 'schedule')),
            target_type         TEXT NOT NULL
                                CHECK (target_type IN ('person', 'project', 'idea', 'admin')),
            target_id           TEXT,
            parameters          TEXT NOT NULL DEFAULT '{}',
            requires_approval   INTEGER NOT NULL DEFAULT 1,
            status              TEXT NOT NULL
                                CHECK (status IN
                                ('pending', 'approved', 'rejected', 'executed',
                                 'failed', 'rolled_back')),
            approved_by         TEXT,
            approved_at         INTEGER,
            executed_at         INTEGER,
            rolled_back_at      INTEGER,
            prior_state         TEXT,
            result              TEXT,
            error               TEXT,
            created_at          INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_actions_tenant_status
            ON actions (tenant_id, status, created_at DESC);

        -- Audit trail: one row per execute or rollback.
        CREATE TABLE IF NOT EXISTS action_history (
            id              TEXT PRIMARY KEY NOT NULL,
            action_id       TEXT NOT NULL,
            action_type     TEXT NOT NULL,
            outcome         TEXT NOT NULL,
            error           TEXT,
            recorded_at     INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_action_history_action
            ON action_history (action_id, recorded_at DESC);

        -- AI-generated multi-step plans.
        CREATE TABLE IF NOT EXISTS plans (
            id              TEXT PRIMARY KEY NOT NULL,
            tenant_id       TEXT NOT NULL,
            user_id         TEXT NOT NULL,
            name            TEXT NOT NULL,
            description     TEXT,
            request         TEXT NOT NULL,
            status          TEXT NOT NULL
                            CHECK (status IN ('pending', 'running', 'completed', 'failed')),
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_plans_tenant
            ON plans (tenant_id, created_at DESC);

        CREATE TABLE IF NOT EXISTS plan_steps (
            plan_id         TEXT NOT NULL REFERENCES plans (id) ON DELETE CASCADE,
            step_order      INTEGER NOT NULL,
            action_type     TEXT NOT NULL,
            target_type     TEXT NOT NULL,
            target_id       TEXT,
            action_params   TEXT NOT NULL DEFAULT '{}',
            dependencies    TEXT NOT NULL DEFAULT '[]',
            description     TEXT NOT NULL DEFAULT '',
            status          TEXT NOT NULL
                            CHECK (status IN
                            ('pending', 'running', 'completed', 'failed', 'skipped')),
            error           TEXT,
            PRIMARY KEY (plan_id, step_order)
        );

        -- Declarative automation rules. Trigger and action templates are
        -- stored as JSON documents.
        CREATE TABLE IF NOT EXISTS workflows (
            id              TEXT PRIMARY KEY NOT NULL,
            tenant_id       TEXT NOT NULL,
            created_by      TEXT NOT NULL,
            name            TEXT NOT NULL,
            trigger         TEXT NOT NULL,
            actions         TEXT NOT NULL,
            priority        INTEGER NOT NULL DEFAULT 0,
            enabled         INTEGER NOT NULL DEFAULT 1,
            last_run_at     INTEGER,
            created_at      INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_workflows_tenant
            ON workflows (tenant_id, enabled, priority DESC);

        -- Directed dependency edges between task records.
        CREATE TABLE IF NOT EXISTS task_dependencies (
            tenant_id           TEXT NOT NULL,
            task_id             TEXT NOT NULL,
            depends_on_task_id  TEXT NOT NULL,
            kind                TEXT NOT NULL
                                CHECK (kind IN ('blocks', 'blocked_by')),
            created_at          INTEGER NOT NULL,
            PRIMARY KEY (tenant_id, task_id, depends_on_task_id)
        );

        CREATE INDEX IF NOT EXISTS idx_task_dependencies_depends_on
            ON task_dependencies (tenant_id, depends_on_task_id);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| LociError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}
