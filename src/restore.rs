//! Point-in-time restore across checkpoints.
//!
//! Restoring to a checkpoint selects every checkpoint in the same scope
//! created at or after the target, collects their undo-log entries, and
//! applies each entry's inverse in global reverse-chronological order.
//! The boundary is inclusive: the target's own changes are reverted too,
//! leaving the scope as it was immediately before the target began.
//!
//! Replay is not transactional across entries. A failure aborts the
//! remainder and reports applied-vs-remaining counts; entries already
//! applied stay applied.

use crate::error::{Error, Result};
use crate::model::checkpoint::CheckpointStatus;
use crate::model::undo::{UndoLogEntry, UndoOperation};
use crate::storage::{EntityStore, SqliteStorage};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, warn};

/// Outcome of a completed restore.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    pub target_id: String,
    /// IDs of every checkpoint reverted by this restore, newest first
    pub checkpoints_reverted: Vec<String>,
    pub entries_applied: usize,
}

/// Replays undo-log entries in reverse to revert scope state.
pub struct RestoreEngine<'a> {
    store: &'a mut SqliteStorage,
}

impl<'a> RestoreEngine<'a> {
    #[must_use]
    pub fn new(store: &'a mut SqliteStorage) -> Self {
        Self { store }
    }

    /// Revert the target checkpoint's scope to its state immediately
    /// before the target began.
    ///
    /// Already-rolled-back checkpoints in the window are skipped; their
    /// entries were inverted once and must not be inverted again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CheckpointNotFound`] for an unknown target, or
    /// [`Error::RestorePartial`] when replay fails partway. On partial
    /// failure only checkpoints whose entries all replayed are marked
    /// `rolled_back`; the rest keep their status.
    pub fn restore_to_checkpoint(&mut self, target_id: &str) -> Result<RestoreReport> {
        let target = self
            .store
            .get_checkpoint(target_id)?
            .ok_or_else(|| Error::CheckpointNotFound {
                id: target_id.to_string(),
            })?;

        let selected: Vec<_> = self
            .store
            .list_checkpoints(Some(target.scope_id), None)?
            .into_iter()
            .filter(|cp| {
                cp.created_at >= target.created_at && cp.status != CheckpointStatus::RolledBack
            })
            .collect();

        let ids: Vec<String> = selected.iter().map(|cp| cp.id.clone()).collect();
        let mut entries = self.store.undo_entries_for_checkpoints(&ids)?;

        // Global reverse-chronological order across all selected
        // checkpoints, not grouped by checkpoint.
        entries.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let mut remaining_per_checkpoint: HashMap<&str, usize> = HashMap::new();
        for entry in &entries {
            *remaining_per_checkpoint
                .entry(entry.checkpoint_id.as_str())
                .or_insert(0) += 1;
        }

        // Checkpoints with no entries are trivially fully reverted
        let mut fully_reverted: Vec<String> = ids
            .iter()
            .filter(|id| !remaining_per_checkpoint.contains_key(id.as_str()))
            .cloned()
            .collect();

        let total = entries.len();
        let mut applied = 0usize;

        for entry in &entries {
            if let Err(e) = apply_inverse(self.store, entry) {
                warn!(
                    checkpoint = %entry.checkpoint_id,
                    entry = entry.id,
                    error = %e,
                    "Restore aborted mid-replay"
                );
                self.finish_checkpoints(&fully_reverted)?;
                return Err(Error::RestorePartial {
                    applied,
                    remaining: total - applied,
                    reason: e.to_string(),
                });
            }

            applied += 1;
            if let Some(remaining) = remaining_per_checkpoint.get_mut(entry.checkpoint_id.as_str())
            {
                *remaining -= 1;
                if *remaining == 0 {
                    fully_reverted.push(entry.checkpoint_id.clone());
                }
            }
        }

        self.finish_checkpoints(&ids)?;

        info!(
            target = target_id,
            checkpoints = ids.len(),
            entries = applied,
            "Restore complete"
        );

        Ok(RestoreReport {
            target_id: target_id.to_string(),
            checkpoints_reverted: ids,
            entries_applied: applied,
        })
    }

    fn finish_checkpoints(&mut self, ids: &[String]) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        for id in ids {
            self.store
                .update_checkpoint_status(id, CheckpointStatus::RolledBack, Some(now))?;
        }
        Ok(())
    }
}

/// Apply one undo-log entry's inverse against the entity store.
///
/// - `insert` → delete the row by primary key (a no-op if already gone)
/// - `update` → write the before-image back over the row
/// - `delete` → re-insert the before-image under its original id
///
/// # Errors
///
/// Returns [`Error::SnapshotMalformed`] for unreadable entries and
/// [`Error::RowVanished`] when an update inverse targets a missing row.
pub(crate) fn apply_inverse(store: &mut SqliteStorage, entry: &UndoLogEntry) -> Result<()> {
    let table = entry.entity_table()?;
    let key = entry.key()?;

    match entry.operation {
        UndoOperation::Insert => {
            store.delete_row(table, key.id)?;
            Ok(())
        }
        UndoOperation::Update => {
            let snapshot = entry.snapshot()?.ok_or_else(|| Error::SnapshotMalformed {
                table: entry.table_name.clone(),
                reason: "update entry has no previous_data".to_string(),
            })?;
            let affected = store.update_row(&snapshot)?;
            if affected == 0 {
                return Err(Error::RowVanished {
                    table: entry.table_name.clone(),
                    id: key.id,
                });
            }
            Ok(())
        }
        UndoOperation::Delete => {
            let snapshot = entry.snapshot()?.ok_or_else(|| Error::SnapshotMalformed {
                table: entry.table_name.clone(),
                reason: "delete entry has no previous_data".to_string(),
            })?;
            store.insert_row_with_id(&snapshot)?;
            Ok(())
        }
    }
}
