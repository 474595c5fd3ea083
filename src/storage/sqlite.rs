//! SQLite storage implementation.
//!
//! This module provides the main storage backend for RuleVault: the
//! checkpoint store plus the write-transaction discipline every mutation
//! path goes through.

use crate::error::{Error, Result};
use crate::model::checkpoint::{Checkpoint, CheckpointSource, CheckpointStatus};
use crate::model::undo::UndoLogEntry;
use crate::storage::schema::apply_schema;
use crate::storage::undo;
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// SQLite-based storage backend.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
}

const CHECKPOINT_COLS: &str = "id, scope_id, application_id, description, user_command, source, \
                               status, tools_executed, has_gaps, created_at, finished_at";

fn checkpoint_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Checkpoint> {
    let source: String = row.get(5)?;
    let status: String = row.get(6)?;
    let tools: String = row.get(7)?;

    Ok(Checkpoint {
        id: row.get(0)?,
        scope_id: row.get(1)?,
        application_id: row.get(2)?,
        description: row.get(3)?,
        user_command: row.get(4)?,
        source: CheckpointSource::from_str(&source),
        status: CheckpointStatus::from_str(&status),
        // tools_executed is display metadata; an unreadable list degrades
        // to empty rather than poisoning the whole row
        tools_executed: serde_json::from_str(&tools).unwrap_or_default(),
        has_gaps: row.get(8)?,
        created_at: row.get(9)?,
        finished_at: row.get(10)?,
    })
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Execute a mutation inside an IMMEDIATE transaction.
    ///
    /// IMMEDIATE takes the write lock up front, so competing processes
    /// serialize here instead of failing mid-write. This is what makes the
    /// single-active-session transition safe across CLI invocations.
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        debug!(op, "mutation");
        let result = f(&tx)?;
        tx.commit()?;

        Ok(result)
    }

    // ==================
    // Checkpoint Operations
    // ==================

    /// Persist a new checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, including the unique-index
    /// violation when another checkpoint is already active.
    pub fn create_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<()> {
        let tools = serde_json::to_string(&checkpoint.tools_executed)?;

        self.mutate("create_checkpoint", |tx| {
            tx.execute(
                "INSERT INTO checkpoints (id, scope_id, application_id, description, user_command, source, status, tools_executed, has_gaps, created_at, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    checkpoint.id,
                    checkpoint.scope_id,
                    checkpoint.application_id,
                    checkpoint.description,
                    checkpoint.user_command,
                    checkpoint.source.as_str(),
                    checkpoint.status.as_str(),
                    tools,
                    checkpoint.has_gaps,
                    checkpoint.created_at,
                    checkpoint.finished_at,
                ],
            )?;
            Ok(())
        })
    }

    /// Get a checkpoint by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>> {
        let sql = format!("SELECT {CHECKPOINT_COLS} FROM checkpoints WHERE id = ?1");
        let checkpoint = self
            .conn
            .query_row(&sql, [id], checkpoint_from_row)
            .optional()?;
        Ok(checkpoint)
    }

    /// Find the single active checkpoint, if a session is open.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_active_checkpoint(&self) -> Result<Option<Checkpoint>> {
        let sql = format!("SELECT {CHECKPOINT_COLS} FROM checkpoints WHERE status = 'active' LIMIT 1");
        let checkpoint = self
            .conn
            .query_row(&sql, [], checkpoint_from_row)
            .optional()?;
        Ok(checkpoint)
    }

    /// List checkpoints, newest first, optionally filtered by scope and/or
    /// application.
    ///
    /// Ties on `created_at` break on insertion order so the listing is
    /// stable even for checkpoints created within the same millisecond.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_checkpoints(
        &self,
        scope_id: Option<i64>,
        application_id: Option<i64>,
    ) -> Result<Vec<Checkpoint>> {
        let mut conditions: Vec<String> = Vec::new();
        let mut params: Vec<i64> = Vec::new();

        if let Some(scope) = scope_id {
            params.push(scope);
            conditions.push(format!("scope_id = ?{}", params.len()));
        }
        if let Some(app) = application_id {
            params.push(app);
            conditions.push(format!("application_id = ?{}", params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {CHECKPOINT_COLS} FROM checkpoints{where_clause}
             ORDER BY created_at DESC, rowid DESC"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let params_refs: Vec<&dyn rusqlite::ToSql> =
            params.iter().map(|p| p as &dyn rusqlite::ToSql).collect();

        let rows = stmt.query_map(params_refs.as_slice(), checkpoint_from_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Update a checkpoint's lifecycle status.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails or the checkpoint is unknown.
    pub fn update_checkpoint_status(
        &mut self,
        id: &str,
        status: CheckpointStatus,
        finished_at: Option<i64>,
    ) -> Result<()> {
        let id = id.to_string();
        self.mutate("update_checkpoint_status", |tx| {
            let rows = tx.execute(
                "UPDATE checkpoints SET status = ?1, finished_at = ?2 WHERE id = ?3",
                rusqlite::params![status.as_str(), finished_at, id],
            )?;

            if rows == 0 {
                return Err(Error::CheckpointNotFound { id: id.clone() });
            }
            Ok(())
        })
    }

    /// Append a tool name to a checkpoint's ordered `tools_executed` list.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint is unknown or the update fails.
    pub fn append_tool_executed(&mut self, id: &str, tool: &str) -> Result<()> {
        let id = id.to_string();
        let tool = tool.to_string();
        self.mutate("append_tool_executed", |tx| {
            let raw: Option<String> = tx
                .query_row(
                    "SELECT tools_executed FROM checkpoints WHERE id = ?1",
                    [&id],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(raw) = raw else {
                return Err(Error::CheckpointNotFound { id: id.clone() });
            };

            let mut tools: Vec<String> = serde_json::from_str(&raw).unwrap_or_default();
            tools.push(tool.clone());

            tx.execute(
                "UPDATE checkpoints SET tools_executed = ?1 WHERE id = ?2",
                rusqlite::params![serde_json::to_string(&tools)?, id],
            )?;
            Ok(())
        })
    }

    /// Flag a checkpoint as having degraded reversibility.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn mark_checkpoint_gaps(&mut self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.mutate("mark_checkpoint_gaps", |tx| {
            tx.execute(
                "UPDATE checkpoints SET has_gaps = 1 WHERE id = ?1",
                [&id],
            )?;
            Ok(())
        })
    }

    /// Delete checkpoints and their undo-log entries. Pure deletion of
    /// history; entity data is never touched.
    ///
    /// Returns the number of checkpoints removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletes fail.
    pub fn delete_checkpoints_cascade(&mut self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let ids: Vec<String> = ids.to_vec();
        self.mutate("delete_checkpoints_cascade", |tx| {
            let placeholders = (1..=ids.len())
                .map(|i| format!("?{i}"))
                .collect::<Vec<_>>()
                .join(", ");
            let params: Vec<&dyn rusqlite::ToSql> =
                ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();

            // Delete undo-log entries first, then the checkpoints
            tx.execute(
                &format!("DELETE FROM undo_log WHERE checkpoint_id IN ({placeholders})"),
                params.as_slice(),
            )?;
            let removed = tx.execute(
                &format!("DELETE FROM checkpoints WHERE id IN ({placeholders})"),
                params.as_slice(),
            )?;
            Ok(removed)
        })
    }

    /// Get all checkpoint IDs (for similar-ID suggestions).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_checkpoint_ids(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("SELECT id FROM checkpoints")?;
        let rows = stmt.query_map([], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    // ==================
    // Undo Log Operations
    // ==================

    /// Append an undo-log entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn append_undo_entry(&mut self, entry: &UndoLogEntry) -> Result<i64> {
        undo::append_entry(&self.conn, entry).map_err(Error::from)
    }

    /// Get a checkpoint's undo entries, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn undo_entries_for_checkpoint(&self, checkpoint_id: &str) -> Result<Vec<UndoLogEntry>> {
        undo::entries_for_checkpoint(&self.conn, checkpoint_id).map_err(Error::from)
    }

    /// Batch-fetch undo entries for a set of checkpoints in one query.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn undo_entries_for_checkpoints(
        &self,
        checkpoint_ids: &[String],
    ) -> Result<Vec<UndoLogEntry>> {
        undo::entries_for_checkpoints(&self.conn, checkpoint_ids).map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::EntityTable;
    use crate::model::undo::{PrimaryKey, UndoOperation};

    fn checkpoint_at(scope_id: i64, created_at: i64, status: CheckpointStatus) -> Checkpoint {
        let mut cp = Checkpoint::new(scope_id, CheckpointSource::Llm);
        cp.created_at = created_at;
        cp.status = status;
        cp
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let mut storage = SqliteStorage::open_memory().unwrap();

        let cp = Checkpoint::new(42, CheckpointSource::Mcp)
            .with_description("Add Email field")
            .with_user_command("add an email field to orders")
            .with_application(7);
        storage.create_checkpoint(&cp).unwrap();

        let fetched = storage.get_checkpoint(&cp.id).unwrap().unwrap();
        assert_eq!(fetched.scope_id, 42);
        assert_eq!(fetched.application_id, Some(7));
        assert_eq!(fetched.description.as_deref(), Some("Add Email field"));
        assert_eq!(fetched.source, CheckpointSource::Mcp);
        assert_eq!(fetched.status, CheckpointStatus::Active);
        assert!(!fetched.has_gaps);
    }

    #[test]
    fn test_find_active_checkpoint() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        assert!(storage.find_active_checkpoint().unwrap().is_none());

        let cp = Checkpoint::new(1, CheckpointSource::Api);
        storage.create_checkpoint(&cp).unwrap();

        let active = storage.find_active_checkpoint().unwrap().unwrap();
        assert_eq!(active.id, cp.id);

        storage
            .update_checkpoint_status(&cp.id, CheckpointStatus::Committed, Some(1))
            .unwrap();
        assert!(storage.find_active_checkpoint().unwrap().is_none());
    }

    #[test]
    fn test_list_checkpoints_newest_first_with_filters() {
        let mut storage = SqliteStorage::open_memory().unwrap();

        let old = checkpoint_at(42, 100, CheckpointStatus::Committed);
        let mid = checkpoint_at(42, 200, CheckpointStatus::Committed);
        let other_scope = checkpoint_at(99, 300, CheckpointStatus::Committed);
        storage.create_checkpoint(&old).unwrap();
        storage.create_checkpoint(&mid).unwrap();
        storage.create_checkpoint(&other_scope).unwrap();

        let all = storage.list_checkpoints(None, None).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let scoped = storage.list_checkpoints(Some(42), None).unwrap();
        assert_eq!(scoped.len(), 2);
        assert_eq!(scoped[0].id, mid.id);
        assert_eq!(scoped[1].id, old.id);
    }

    #[test]
    fn test_update_status_unknown_checkpoint() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let err = storage
            .update_checkpoint_status("ckpt_missing", CheckpointStatus::Committed, None)
            .unwrap_err();
        assert!(matches!(err, Error::CheckpointNotFound { .. }));
    }

    #[test]
    fn test_append_tool_executed_preserves_order() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let cp = Checkpoint::new(1, CheckpointSource::Llm);
        storage.create_checkpoint(&cp).unwrap();

        storage.append_tool_executed(&cp.id, "save_field").unwrap();
        storage.append_tool_executed(&cp.id, "save_view").unwrap();
        storage.append_tool_executed(&cp.id, "save_field").unwrap();

        let fetched = storage.get_checkpoint(&cp.id).unwrap().unwrap();
        assert_eq!(
            fetched.tools_executed,
            vec!["save_field", "save_view", "save_field"]
        );
    }

    #[test]
    fn test_mark_checkpoint_gaps() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let cp = Checkpoint::new(1, CheckpointSource::Llm);
        storage.create_checkpoint(&cp).unwrap();

        storage.mark_checkpoint_gaps(&cp.id).unwrap();
        assert!(storage.get_checkpoint(&cp.id).unwrap().unwrap().has_gaps);
    }

    #[test]
    fn test_cascade_delete_leaves_other_scopes() {
        let mut storage = SqliteStorage::open_memory().unwrap();

        let mine = checkpoint_at(42, 100, CheckpointStatus::Committed);
        let other = checkpoint_at(99, 200, CheckpointStatus::Committed);
        storage.create_checkpoint(&mine).unwrap();
        storage.create_checkpoint(&other).unwrap();

        for cp_id in [&mine.id, &other.id] {
            storage
                .append_undo_entry(&UndoLogEntry::new(
                    cp_id,
                    UndoOperation::Insert,
                    EntityTable::Fields,
                    PrimaryKey::new(1),
                    None,
                ))
                .unwrap();
        }

        let removed = storage
            .delete_checkpoints_cascade(&[mine.id.clone()])
            .unwrap();
        assert_eq!(removed, 1);

        assert!(storage.get_checkpoint(&mine.id).unwrap().is_none());
        assert!(storage
            .undo_entries_for_checkpoint(&mine.id)
            .unwrap()
            .is_empty());

        // Other scope untouched
        assert!(storage.get_checkpoint(&other.id).unwrap().is_some());
        assert_eq!(
            storage.undo_entries_for_checkpoint(&other.id).unwrap().len(),
            1
        );
    }
}
