//! Database schema definitions and migration logic.
//!
//! This module contains the complete SQLite schema for RuleVault: the
//! builder's entity tables plus the checkpoint and undo-log tables.

use rusqlite::{Connection, Result};

/// Current schema version for migration tracking.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// The complete SQL schema for the RuleVault database.
///
/// Note: Timestamps are stored as INTEGER (Unix milliseconds) throughout.
pub const SCHEMA_SQL: &str = r"
-- ====================
-- Schema Version Tracking
-- ====================

CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

-- ====================
-- Entity Tables (the builder's data model)
-- ====================

-- Applications: top-level scope spanning multiple objects
CREATE TABLE IF NOT EXISTS applications (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    description TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);

-- Objects: workflow objects, the owning scope for fields/views/tables
CREATE TABLE IF NOT EXISTS objects (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    application_id INTEGER,
    name TEXT NOT NULL,
    label TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (application_id) REFERENCES applications(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_objects_application ON objects(application_id);
CREATE INDEX IF NOT EXISTS idx_objects_name ON objects(name);

-- Fields: data columns on an object
CREATE TABLE IF NOT EXISTS fields (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    object_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    field_type TEXT NOT NULL DEFAULT 'text',
    required INTEGER NOT NULL DEFAULT 0,
    options TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (object_id) REFERENCES objects(id) ON DELETE CASCADE,
    UNIQUE(object_id, name)
);

CREATE INDEX IF NOT EXISTS idx_fields_object ON fields(object_id);

-- Views: UI views bound to an object
CREATE TABLE IF NOT EXISTS views (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    object_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    view_type TEXT NOT NULL DEFAULT 'list',
    config TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (object_id) REFERENCES objects(id) ON DELETE CASCADE,
    UNIQUE(object_id, name)
);

CREATE INDEX IF NOT EXISTS idx_views_object ON views(object_id);

-- Themes: visual themes, optionally scoped to an application
CREATE TABLE IF NOT EXISTS themes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    application_id INTEGER,
    name TEXT NOT NULL,
    palette TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (application_id) REFERENCES applications(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_themes_application ON themes(application_id);

-- Decision tables: rule tables attached to an object's workflow
CREATE TABLE IF NOT EXISTS decision_tables (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    object_id INTEGER NOT NULL,
    name TEXT NOT NULL,
    rules TEXT,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL,
    FOREIGN KEY (object_id) REFERENCES objects(id) ON DELETE CASCADE,
    UNIQUE(object_id, name)
);

CREATE INDEX IF NOT EXISTS idx_decision_tables_object ON decision_tables(object_id);

-- ====================
-- Checkpoints
-- ====================

CREATE TABLE IF NOT EXISTS checkpoints (
    id TEXT PRIMARY KEY,
    scope_id INTEGER NOT NULL,
    application_id INTEGER,
    description TEXT,
    user_command TEXT,
    source TEXT NOT NULL DEFAULT 'api',
    status TEXT NOT NULL DEFAULT 'active',
    tools_executed TEXT NOT NULL DEFAULT '[]',
    has_gaps INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    finished_at INTEGER
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_scope ON checkpoints(scope_id);
CREATE INDEX IF NOT EXISTS idx_checkpoints_application ON checkpoints(application_id);
CREATE INDEX IF NOT EXISTS idx_checkpoints_status ON checkpoints(status);
CREATE INDEX IF NOT EXISTS idx_checkpoints_created ON checkpoints(created_at DESC);

-- At most one open session, enforced by the database itself
CREATE UNIQUE INDEX IF NOT EXISTS idx_checkpoints_single_active
    ON checkpoints(status) WHERE status = 'active';

-- ====================
-- Undo Log
-- ====================

CREATE TABLE IF NOT EXISTS undo_log (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    checkpoint_id TEXT NOT NULL,
    operation TEXT NOT NULL,
    table_name TEXT NOT NULL,
    primary_key TEXT NOT NULL,
    previous_data TEXT,
    created_at INTEGER NOT NULL,
    FOREIGN KEY (checkpoint_id) REFERENCES checkpoints(id) ON DELETE CASCADE,
    CHECK (operation IN ('insert', 'update', 'delete'))
);

CREATE INDEX IF NOT EXISTS idx_undo_log_checkpoint ON undo_log(checkpoint_id);
CREATE INDEX IF NOT EXISTS idx_undo_log_created ON undo_log(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_undo_log_table ON undo_log(table_name);
";

/// Apply the schema to the database.
///
/// This uses `execute_batch` to run the entire DDL script.
/// It is idempotent because all statements use `IF NOT EXISTS`.
///
/// # Errors
///
/// Returns an error if the SQL execution fails or pragmas cannot be set.
pub fn apply_schema(conn: &Connection) -> Result<()> {
    // Set pragmas before schema creation
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;

    // Apply schema
    conn.execute_batch(SCHEMA_SQL)?;

    // Run migrations for existing databases
    super::migrations::run_migrations(conn)?;

    // Record schema version
    conn.execute(
        "INSERT OR IGNORE INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![
            format!("v{CURRENT_SCHEMA_VERSION}"),
            chrono::Utc::now().timestamp_millis()
        ],
    )?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).expect("Failed to apply schema");

        // Verify core tables exist
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        assert!(tables.contains(&"applications".to_string()));
        assert!(tables.contains(&"objects".to_string()));
        assert!(tables.contains(&"fields".to_string()));
        assert!(tables.contains(&"views".to_string()));
        assert!(tables.contains(&"themes".to_string()));
        assert!(tables.contains(&"decision_tables".to_string()));
        assert!(tables.contains(&"checkpoints".to_string()));
        assert!(tables.contains(&"undo_log".to_string()));
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();

        // Apply twice - should not fail
        apply_schema(&conn).expect("First apply failed");
        apply_schema(&conn).expect("Second apply failed");
    }

    #[test]
    fn test_foreign_keys_enabled() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let fk_enabled: i32 = conn
            .query_row("PRAGMA foreign_keys", [], |row| row.get(0))
            .unwrap();
        assert_eq!(fk_enabled, 1);
    }

    #[test]
    fn test_operation_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO checkpoints (id, scope_id, created_at) VALUES ('ckpt_t', 1, 0)",
            [],
        )
        .unwrap();

        let ok = conn.execute(
            "INSERT INTO undo_log (checkpoint_id, operation, table_name, primary_key, created_at)
             VALUES ('ckpt_t', 'insert', 'fields', '{\"id\":1}', 0)",
            [],
        );
        assert!(ok.is_ok());

        let bad = conn.execute(
            "INSERT INTO undo_log (checkpoint_id, operation, table_name, primary_key, created_at)
             VALUES ('ckpt_t', 'upsert', 'fields', '{\"id\":1}', 0)",
            [],
        );
        assert!(bad.is_err());
    }

    #[test]
    fn test_single_active_checkpoint_enforced() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO checkpoints (id, scope_id, status, created_at) VALUES ('ckpt_a', 1, 'active', 0)",
            [],
        )
        .unwrap();

        // A second active checkpoint violates the partial unique index
        let second = conn.execute(
            "INSERT INTO checkpoints (id, scope_id, status, created_at) VALUES ('ckpt_b', 2, 'active', 0)",
            [],
        );
        assert!(second.is_err());

        // Terminal statuses are unconstrained
        conn.execute(
            "INSERT INTO checkpoints (id, scope_id, status, created_at) VALUES ('ckpt_c', 3, 'committed', 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO checkpoints (id, scope_id, status, created_at) VALUES ('ckpt_d', 4, 'committed', 0)",
            [],
        )
        .unwrap();
    }

    #[test]
    fn test_undo_log_cascades_with_checkpoint() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        conn.execute(
            "INSERT INTO checkpoints (id, scope_id, created_at) VALUES ('ckpt_x', 1, 0)",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO undo_log (checkpoint_id, operation, table_name, primary_key, created_at)
             VALUES ('ckpt_x', 'insert', 'fields', '{\"id\":1}', 0)",
            [],
        )
        .unwrap();

        conn.execute("DELETE FROM checkpoints WHERE id = 'ckpt_x'", [])
            .unwrap();

        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM undo_log", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
