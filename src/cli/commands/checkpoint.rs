//! Checkpoint command implementations: restore, delete, delete-all.

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::session::manager::SessionManager;
use crate::storage::SqliteStorage;
use std::path::PathBuf;

/// Attach similar-ID suggestions to a not-found error.
fn not_found_with_suggestions(storage: &SqliteStorage, id: &str) -> Error {
    let all_ids = storage.all_checkpoint_ids().unwrap_or_default();
    let similar = crate::validate::find_similar_ids(id, &all_ids, 3);
    if similar.is_empty() {
        Error::CheckpointNotFound { id: id.to_string() }
    } else {
        Error::CheckpointNotFoundSimilar {
            id: id.to_string(),
            similar,
        }
    }
}

/// Execute the restore command.
///
/// # Errors
///
/// Returns an error if the checkpoint is unknown or replay fails.
pub fn execute_restore(id: &str, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(|p| p.as_path())).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    let mut storage = SqliteStorage::open(&db_path)?;

    let report = SessionManager::new(&mut storage)
        .restore_to(id)
        .map_err(|e| match e {
            Error::CheckpointNotFound { .. } => not_found_with_suggestions(&storage, id),
            other => other,
        })?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!("Restored to before checkpoint: {}", report.target_id);
        println!("  Checkpoints reverted: {}", report.checkpoints_reverted.len());
        println!("  Entries applied: {}", report.entries_applied);
    }

    Ok(())
}

/// Execute the delete command.
///
/// # Errors
///
/// Returns an error if the checkpoint is unknown or the delete fails.
pub fn execute_delete(id: &str, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(|p| p.as_path())).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    let mut storage = SqliteStorage::open(&db_path)?;

    SessionManager::new(&mut storage)
        .delete_checkpoint(id)
        .map_err(|e| match e {
            Error::CheckpointNotFound { .. } => not_found_with_suggestions(&storage, id),
            other => other,
        })?;

    if json {
        println!("{}", serde_json::json!({ "id": id, "deleted": true }));
    } else {
        println!("Deleted checkpoint: {id}");
    }

    Ok(())
}

/// Execute the delete-all command.
///
/// # Errors
///
/// Returns an error if the deletes fail.
pub fn execute_delete_all(
    scope_id: Option<i64>,
    application_id: Option<i64>,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(|p| p.as_path())).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    let mut storage = SqliteStorage::open(&db_path)?;
    let removed = SessionManager::new(&mut storage).delete_all(scope_id, application_id)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": removed }));
    } else if removed == 0 {
        println!("No checkpoints to delete.");
    } else {
        println!("Deleted {removed} checkpoint(s).");
    }

    Ok(())
}
