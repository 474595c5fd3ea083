//! Undo-log storage and retrieval.
//!
//! The undo log is append-only: entries are written once while a session is
//! open and never modified afterwards. Queries return entries
//! reverse-chronologically (newest first) because the only consumers are
//! reverse replay and history projection.

use crate::model::undo::{UndoLogEntry, UndoOperation};
use rusqlite::{Connection, Result};

/// Append an entry to the undo log.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn append_entry(conn: &Connection, entry: &UndoLogEntry) -> Result<i64> {
    conn.execute(
        "INSERT INTO undo_log (checkpoint_id, operation, table_name, primary_key, previous_data, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            entry.checkpoint_id,
            entry.operation.as_str(),
            entry.table_name,
            entry.primary_key,
            entry.previous_data,
            entry.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get all entries for one checkpoint, newest first.
///
/// Ties on `created_at` (entries within the same millisecond) break on the
/// row id, so replay order always matches append order reversed.
///
/// # Errors
///
/// Returns an error if the query fails or a stored operation is unreadable.
pub fn entries_for_checkpoint(conn: &Connection, checkpoint_id: &str) -> Result<Vec<UndoLogEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, checkpoint_id, operation, table_name, primary_key, previous_data, created_at
         FROM undo_log
         WHERE checkpoint_id = ?1
         ORDER BY created_at DESC, id DESC",
    )?;

    let rows = stmt.query_map([checkpoint_id], entry_from_row)?;
    rows.collect()
}

/// Get all entries for a set of checkpoints in one query, ordered by
/// `(checkpoint_id, created_at DESC, id DESC)`.
///
/// Used by the history projector and restore engine, which both need every
/// entry for a window of checkpoints without a round trip per checkpoint.
///
/// # Errors
///
/// Returns an error if the query fails or a stored operation is unreadable.
pub fn entries_for_checkpoints(
    conn: &Connection,
    checkpoint_ids: &[String],
) -> Result<Vec<UndoLogEntry>> {
    if checkpoint_ids.is_empty() {
        return Ok(Vec::new());
    }

    let placeholders = (1..=checkpoint_ids.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "SELECT id, checkpoint_id, operation, table_name, primary_key, previous_data, created_at
         FROM undo_log
         WHERE checkpoint_id IN ({placeholders})
         ORDER BY checkpoint_id, created_at DESC, id DESC"
    );

    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::ToSql> = checkpoint_ids
        .iter()
        .map(|id| id as &dyn rusqlite::ToSql)
        .collect();

    let rows = stmt.query_map(params.as_slice(), entry_from_row)?;
    rows.collect()
}

/// Count entries for one checkpoint.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn count_for_checkpoint(conn: &Connection, checkpoint_id: &str) -> Result<i64> {
    conn.query_row(
        "SELECT COUNT(*) FROM undo_log WHERE checkpoint_id = ?1",
        [checkpoint_id],
        |row| row.get(0),
    )
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> Result<UndoLogEntry> {
    let op_str: String = row.get(2)?;
    let operation = UndoOperation::parse(&op_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("unknown undo operation: {op_str}").into(),
        )
    })?;

    Ok(UndoLogEntry {
        id: row.get(0)?,
        checkpoint_id: row.get(1)?,
        operation,
        table_name: row.get(3)?,
        primary_key: row.get(4)?,
        previous_data: row.get(5)?,
        created_at: row.get(6)?,
    })
}
