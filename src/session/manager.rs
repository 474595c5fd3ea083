//! Checkpoint session manager.
//!
//! Owns the begin/commit/rollback lifecycle. The active-session handle is
//! the `status = 'active'` checkpoint row itself: the database is the
//! single source of truth, and a partial unique index guarantees at most
//! one open session no matter how many processes share the file.

use crate::error::{Error, Result};
use crate::model::checkpoint::{Checkpoint, CheckpointSource, CheckpointStatus};
use crate::restore::{self, RestoreEngine, RestoreReport};
use crate::storage::SqliteStorage;
use serde::Serialize;
use tracing::{info, warn};

/// Everything `begin` needs to open a session.
#[derive(Debug, Clone)]
pub struct BeginRequest {
    pub scope_id: i64,
    pub description: Option<String>,
    pub user_command: Option<String>,
    pub source: CheckpointSource,
    pub application_id: Option<i64>,
}

/// Outcome of rolling one checkpoint back.
#[derive(Debug, Clone, Serialize)]
pub struct RollbackOutcome {
    pub checkpoint_id: String,
    pub entries_reverted: usize,
}

/// Orchestrates the single active checkpoint session.
pub struct SessionManager<'a> {
    store: &'a mut SqliteStorage,
}

impl<'a> SessionManager<'a> {
    #[must_use]
    pub fn new(store: &'a mut SqliteStorage) -> Self {
        Self { store }
    }

    /// Open a new checkpoint session.
    ///
    /// If a session is already active it is rolled back first, as an
    /// explicit, logged `active -> rolled_back` transition rather than a
    /// silent side effect.
    ///
    /// # Errors
    ///
    /// Returns an error if the implicit rollback fails or the new
    /// checkpoint cannot be persisted.
    pub fn begin(&mut self, request: BeginRequest) -> Result<Checkpoint> {
        if let Some(active) = self.store.find_active_checkpoint()? {
            warn!(
                checkpoint = %active.id,
                scope = active.scope_id,
                "Beginning a new session while one is active; rolling the old one back"
            );
            self.rollback_checkpoint(&active)?;
        }

        let mut checkpoint = Checkpoint::new(request.scope_id, request.source);
        if let Some(description) = &request.description {
            checkpoint = checkpoint.with_description(description);
        }
        if let Some(command) = &request.user_command {
            checkpoint = checkpoint.with_user_command(command);
        }
        if let Some(application_id) = request.application_id {
            checkpoint = checkpoint.with_application(application_id);
        }

        self.store.create_checkpoint(&checkpoint)?;
        info!(checkpoint = %checkpoint.id, scope = checkpoint.scope_id, "Session started");

        Ok(checkpoint)
    }

    /// Commit the active session, making its mutations permanent.
    ///
    /// Returns `None` (logged, no-op) if no session is active.
    ///
    /// # Errors
    ///
    /// Returns an error if the status update fails.
    pub fn commit(&mut self) -> Result<Option<Checkpoint>> {
        let Some(active) = self.store.find_active_checkpoint()? else {
            warn!("Commit requested with no active session");
            return Ok(None);
        };

        let now = chrono::Utc::now().timestamp_millis();
        self.store
            .update_checkpoint_status(&active.id, CheckpointStatus::Committed, Some(now))?;
        info!(checkpoint = %active.id, "Session committed");

        let committed = self.store.get_checkpoint(&active.id)?;
        Ok(committed)
    }

    /// Roll back the active session, reverting every captured mutation
    /// most-recent-first.
    ///
    /// Returns `None` (logged, no-op) if no session is active.
    ///
    /// # Errors
    ///
    /// Returns [`Error::RestorePartial`] if an inverse fails partway; the
    /// checkpoint is still marked `rolled_back` (the session is over
    /// either way) and the partial state is reported, not hidden.
    pub fn rollback(&mut self) -> Result<Option<RollbackOutcome>> {
        let Some(active) = self.store.find_active_checkpoint()? else {
            warn!("Rollback requested with no active session");
            return Ok(None);
        };

        let outcome = self.rollback_checkpoint(&active)?;
        Ok(Some(outcome))
    }

    /// Get the active session, if one is open. Pure read.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn active_session(&self) -> Result<Option<Checkpoint>> {
        self.store.find_active_checkpoint()
    }

    /// List non-terminal checkpoints for a scope.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn active_checkpoints(
        &self,
        scope_id: Option<i64>,
        application_id: Option<i64>,
    ) -> Result<Vec<Checkpoint>> {
        let checkpoints = self.store.list_checkpoints(scope_id, application_id)?;
        Ok(checkpoints
            .into_iter()
            .filter(|cp| !cp.status.is_terminal())
            .collect())
    }

    /// List checkpoints for a scope, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn history(
        &self,
        scope_id: Option<i64>,
        application_id: Option<i64>,
    ) -> Result<Vec<Checkpoint>> {
        self.store.list_checkpoints(scope_id, application_id)
    }

    /// Restore the target checkpoint's scope via the restore engine.
    ///
    /// Any active session is rolled back first so the replay never races
    /// an open capture window.
    ///
    /// # Errors
    ///
    /// Returns an error if the rollback or restore fails.
    pub fn restore_to(&mut self, checkpoint_id: &str) -> Result<RestoreReport> {
        if let Some(active) = self.store.find_active_checkpoint()? {
            warn!(
                checkpoint = %active.id,
                "Restore requested while a session is active; rolling it back first"
            );
            self.rollback_checkpoint(&active)?;
        }

        RestoreEngine::new(self.store).restore_to_checkpoint(checkpoint_id)
    }

    /// Delete one checkpoint and its undo-log entries.
    ///
    /// Pure deletion of history; entity data is never reverted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CheckpointNotFound`] for an unknown id.
    pub fn delete_checkpoint(&mut self, id: &str) -> Result<()> {
        if self.store.get_checkpoint(id)?.is_none() {
            return Err(Error::CheckpointNotFound { id: id.to_string() });
        }
        self.store.delete_checkpoints_cascade(&[id.to_string()])?;
        info!(checkpoint = id, "Checkpoint deleted");
        Ok(())
    }

    /// Delete every checkpoint in a scope (and their undo-log entries).
    ///
    /// Returns the number of checkpoints removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the deletes fail.
    pub fn delete_all(
        &mut self,
        scope_id: Option<i64>,
        application_id: Option<i64>,
    ) -> Result<usize> {
        let ids: Vec<String> = self
            .store
            .list_checkpoints(scope_id, application_id)?
            .into_iter()
            .map(|cp| cp.id)
            .collect();

        let removed = self.store.delete_checkpoints_cascade(&ids)?;
        info!(scope = ?scope_id, removed, "Checkpoints deleted");
        Ok(removed)
    }

    /// Revert one checkpoint's entries most-recent-first and mark it
    /// `rolled_back`.
    fn rollback_checkpoint(&mut self, checkpoint: &Checkpoint) -> Result<RollbackOutcome> {
        let entries = self.store.undo_entries_for_checkpoint(&checkpoint.id)?;
        let total = entries.len();

        let mut applied = 0usize;
        let mut failure: Option<Error> = None;
        for entry in &entries {
            match restore::apply_inverse(self.store, entry) {
                Ok(()) => applied += 1,
                Err(e) => {
                    warn!(
                        checkpoint = %checkpoint.id,
                        entry = entry.id,
                        error = %e,
                        "Rollback aborted mid-replay"
                    );
                    failure = Some(e);
                    break;
                }
            }
        }

        // The session ends either way; a half-reverted checkpoint must not
        // keep accepting captures.
        let now = chrono::Utc::now().timestamp_millis();
        self.store
            .update_checkpoint_status(&checkpoint.id, CheckpointStatus::RolledBack, Some(now))?;

        if let Some(e) = failure {
            return Err(Error::RestorePartial {
                applied,
                remaining: total - applied,
                reason: e.to_string(),
            });
        }

        info!(checkpoint = %checkpoint.id, entries = applied, "Session rolled back");
        Ok(RollbackOutcome {
            checkpoint_id: checkpoint.id.clone(),
            entries_reverted: applied,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::entity::{EntityTable, ObjectDef, RowSnapshot};
    use crate::session::capture::{FieldDraft, MutationCapture, ObjectDraft};
    use crate::storage::EntityStore;

    fn request(scope_id: i64) -> BeginRequest {
        BeginRequest {
            scope_id,
            description: None,
            user_command: None,
            source: CheckpointSource::Llm,
            application_id: None,
        }
    }

    fn seed_object(storage: &mut SqliteStorage, name: &str) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        storage
            .insert_row(&RowSnapshot::Object(ObjectDef {
                id: 0,
                application_id: None,
                name: name.to_string(),
                label: None,
                created_at: now,
                updated_at: now,
            }))
            .unwrap()
    }

    fn field_draft(object_id: i64, name: &str) -> FieldDraft {
        FieldDraft {
            id: None,
            object_id,
            name: name.to_string(),
            field_type: "text".to_string(),
            required: false,
            options: None,
            intent: None,
        }
    }

    #[test]
    fn round_trip_insert() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = seed_object(&mut storage, "Orders");

        SessionManager::new(&mut storage).begin(request(object_id)).unwrap();
        let outcome = MutationCapture::new(&mut storage)
            .save_field(field_draft(object_id, "email"))
            .unwrap();
        let field_id = outcome.rows[0].id();
        assert!(storage.get_row(EntityTable::Fields, field_id).unwrap().is_some());

        let rolled = SessionManager::new(&mut storage).rollback().unwrap().unwrap();
        assert_eq!(rolled.entries_reverted, 1);
        assert!(storage.get_row(EntityTable::Fields, field_id).unwrap().is_none());
    }

    #[test]
    fn round_trip_update_restores_exact_value() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = seed_object(&mut storage, "Orders");

        // Row exists before the session
        let field_id = MutationCapture::new(&mut storage)
            .save_field(field_draft(object_id, "email"))
            .unwrap()
            .rows[0]
            .id();
        let before = storage.get_row(EntityTable::Fields, field_id).unwrap().unwrap();

        SessionManager::new(&mut storage).begin(request(object_id)).unwrap();
        let mut updated = field_draft(object_id, "email");
        updated.id = Some(field_id);
        updated.field_type = "email".to_string();
        updated.required = true;
        MutationCapture::new(&mut storage).save_field(updated).unwrap();

        SessionManager::new(&mut storage).rollback().unwrap().unwrap();

        let after = storage.get_row(EntityTable::Fields, field_id).unwrap().unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn round_trip_delete_restores_identical_contents() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = seed_object(&mut storage, "Orders");

        let mut draft = field_draft(object_id, "email");
        draft.options = Some(serde_json::json!({"max_length": 255}));
        let field_id = MutationCapture::new(&mut storage)
            .save_field(draft)
            .unwrap()
            .rows[0]
            .id();
        let before = storage.get_row(EntityTable::Fields, field_id).unwrap().unwrap();

        SessionManager::new(&mut storage).begin(request(object_id)).unwrap();
        MutationCapture::new(&mut storage).delete_field(field_id).unwrap();
        assert!(storage.get_row(EntityTable::Fields, field_id).unwrap().is_none());

        SessionManager::new(&mut storage).rollback().unwrap().unwrap();

        let after = storage.get_row(EntityTable::Fields, field_id).unwrap().unwrap();
        assert_eq!(after, before);
    }

    #[test]
    fn commit_is_permanent_and_later_rollback_is_a_noop() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = seed_object(&mut storage, "Orders");

        SessionManager::new(&mut storage).begin(request(object_id)).unwrap();
        let field_id = MutationCapture::new(&mut storage)
            .save_field(field_draft(object_id, "email"))
            .unwrap()
            .rows[0]
            .id();

        let committed = SessionManager::new(&mut storage).commit().unwrap().unwrap();
        assert_eq!(committed.status, CheckpointStatus::Committed);
        assert!(committed.finished_at.is_some());

        // No active session left; rollback is a logged no-op
        let rolled = SessionManager::new(&mut storage).rollback().unwrap();
        assert!(rolled.is_none());
        assert!(storage.get_row(EntityTable::Fields, field_id).unwrap().is_some());
    }

    #[test]
    fn commit_without_session_is_a_noop() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        assert!(SessionManager::new(&mut storage).commit().unwrap().is_none());
    }

    #[test]
    fn second_begin_rolls_back_the_first_session() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = seed_object(&mut storage, "Orders");

        let first = SessionManager::new(&mut storage).begin(request(object_id)).unwrap();
        let field_id = MutationCapture::new(&mut storage)
            .save_field(field_draft(object_id, "email"))
            .unwrap()
            .rows[0]
            .id();

        let second = SessionManager::new(&mut storage).begin(request(object_id)).unwrap();

        // First session's mutation reverted, status rolled_back
        assert!(storage.get_row(EntityTable::Fields, field_id).unwrap().is_none());
        let first_cp = storage.get_checkpoint(&first.id).unwrap().unwrap();
        assert_eq!(first_cp.status, CheckpointStatus::RolledBack);

        // Second session is the active one
        let active = SessionManager::new(&mut storage).active_session().unwrap().unwrap();
        assert_eq!(active.id, second.id);
    }

    #[test]
    fn history_is_ordered_newest_first() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = seed_object(&mut storage, "Orders");

        for _ in 0..3 {
            SessionManager::new(&mut storage).begin(request(object_id)).unwrap();
            SessionManager::new(&mut storage).commit().unwrap();
        }

        let history = SessionManager::new(&mut storage)
            .history(Some(object_id), None)
            .unwrap();
        assert_eq!(history.len(), 3);
        assert!(history
            .windows(2)
            .all(|w| w[0].created_at >= w[1].created_at));
    }

    /// Renaming an object under a session and rolling back brings the old
    /// name back and leaves no active checkpoints.
    #[test]
    fn object_rename_rollback_scenario() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = seed_object(&mut storage, "Old");

        SessionManager::new(&mut storage).begin(request(object_id)).unwrap();
        MutationCapture::new(&mut storage)
            .save_object(ObjectDraft {
                id: Some(object_id),
                application_id: None,
                name: "New".to_string(),
                label: None,
                intent: None,
            })
            .unwrap();
        assert_eq!(
            storage.get_row(EntityTable::Objects, object_id).unwrap().unwrap().name(),
            "New"
        );

        SessionManager::new(&mut storage).rollback().unwrap().unwrap();

        assert_eq!(
            storage.get_row(EntityTable::Objects, object_id).unwrap().unwrap().name(),
            "Old"
        );
        let active = SessionManager::new(&mut storage)
            .active_checkpoints(Some(object_id), None)
            .unwrap();
        assert!(active.is_empty());
    }

    #[test]
    fn delete_all_removes_history_without_reverting_data() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let orders = seed_object(&mut storage, "Orders");
        let invoices = seed_object(&mut storage, "Invoices");

        SessionManager::new(&mut storage).begin(request(orders)).unwrap();
        let field_id = MutationCapture::new(&mut storage)
            .save_field(field_draft(orders, "email"))
            .unwrap()
            .rows[0]
            .id();
        SessionManager::new(&mut storage).commit().unwrap();

        SessionManager::new(&mut storage).begin(request(invoices)).unwrap();
        MutationCapture::new(&mut storage)
            .save_field(field_draft(invoices, "number"))
            .unwrap();
        SessionManager::new(&mut storage).commit().unwrap();

        let removed = SessionManager::new(&mut storage)
            .delete_all(Some(orders), None)
            .unwrap();
        assert_eq!(removed, 1);

        // History gone, data intact, other scope untouched
        assert!(SessionManager::new(&mut storage)
            .history(Some(orders), None)
            .unwrap()
            .is_empty());
        assert!(storage.get_row(EntityTable::Fields, field_id).unwrap().is_some());
        assert_eq!(
            SessionManager::new(&mut storage)
                .history(Some(invoices), None)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn delete_unknown_checkpoint_errors() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let err = SessionManager::new(&mut storage)
            .delete_checkpoint("ckpt_missing")
            .unwrap_err();
        assert!(matches!(err, Error::CheckpointNotFound { .. }));
    }
}
