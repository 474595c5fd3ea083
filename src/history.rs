//! Read-side history projection.
//!
//! Joins checkpoints, undo-log entries, and current entity state into
//! human-readable change summaries. Everything here is recomputed per
//! query; nothing is persisted.
//!
//! Query discipline: one query for the checkpoints, one for all their undo
//! entries, then one batched current-row lookup per table. Never one round
//! trip per checkpoint.

use crate::error::Result;
use crate::model::change::{
    CategoryChanges, CheckoutGroup, CheckoutSummary, CheckpointWithChanges, RuleChange,
    StatusReport, StatusSummary,
};
use crate::model::checkpoint::Checkpoint;
use crate::model::entity::{EntityTable, RowSnapshot, RuleCategory};
use crate::model::undo::{UndoLogEntry, UndoOperation};
use crate::storage::{EntityStore, SqliteStorage};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Where a checkout group hangs: an owning object, an application, or
/// nothing (unscoped application-level rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum OwnerKey {
    Object(i64),
    Application(i64),
    Global,
}

/// Builds de-duplicated, human-readable change summaries.
pub struct HistoryProjector<'a> {
    store: &'a SqliteStorage,
}

impl<'a> HistoryProjector<'a> {
    #[must_use]
    pub fn new(store: &'a SqliteStorage) -> Self {
        Self { store }
    }

    /// Checkpoints for a scope, newest first, each augmented with its
    /// resolved rule changes.
    ///
    /// Entries that cannot be resolved to a display name (row gone and not
    /// a delete, or an unreadable record) are dropped from the summary
    /// with a debug log; they are never an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if a query fails. Empty scopes produce empty
    /// collections.
    pub fn history_with_changes(
        &self,
        scope_id: Option<i64>,
        application_id: Option<i64>,
    ) -> Result<Vec<CheckpointWithChanges>> {
        let checkpoints = self.store.list_checkpoints(scope_id, application_id)?;
        let ids: Vec<String> = checkpoints.iter().map(|cp| cp.id.clone()).collect();
        let entries = self.store.undo_entries_for_checkpoints(&ids)?;
        let current = self.fetch_current_rows(&entries)?;

        let mut by_checkpoint: HashMap<&str, Vec<&UndoLogEntry>> = HashMap::new();
        for entry in &entries {
            by_checkpoint
                .entry(entry.checkpoint_id.as_str())
                .or_default()
                .push(entry);
        }

        let mut out = Vec::with_capacity(checkpoints.len());
        for checkpoint in checkpoints {
            let updated_rules = by_checkpoint
                .get(checkpoint.id.as_str())
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|entry| resolve_change(entry, &checkpoint, &current))
                        .map(|(change, _)| change)
                        .collect()
                })
                .unwrap_or_default();

            out.push(CheckpointWithChanges {
                checkpoint,
                updated_rules,
            });
        }
        Ok(out)
    }

    /// The "checkout" aggregation: every row touched across the scope's
    /// checkpoints exactly once (most recent checkpoint wins), grouped by
    /// owning object and category.
    ///
    /// Groups sort alphabetically by resolved owner name; rules within a
    /// category keep recency order.
    ///
    /// # Errors
    ///
    /// Returns an error only if a query fails.
    pub fn checkout_summary(
        &self,
        scope_id: Option<i64>,
        application_id: Option<i64>,
    ) -> Result<CheckoutSummary> {
        let checkpoints = self.store.list_checkpoints(scope_id, application_id)?;
        let ids: Vec<String> = checkpoints.iter().map(|cp| cp.id.clone()).collect();
        let entries = self.store.undo_entries_for_checkpoints(&ids)?;
        let current = self.fetch_current_rows(&entries)?;

        let mut by_checkpoint: HashMap<&str, Vec<&UndoLogEntry>> = HashMap::new();
        for entry in &entries {
            by_checkpoint
                .entry(entry.checkpoint_id.as_str())
                .or_default()
                .push(entry);
        }

        // Checkpoints are newest first and entries within each are newest
        // first, so the first time a (table, id) pair appears it is the
        // most recent touch.
        let mut seen: HashSet<(EntityTable, i64)> = HashSet::new();
        let mut grouped: HashMap<OwnerKey, BTreeMap<RuleCategory, Vec<RuleChange>>> = HashMap::new();
        let mut total = 0usize;

        for checkpoint in &checkpoints {
            let Some(cp_entries) = by_checkpoint.get(checkpoint.id.as_str()) else {
                continue;
            };
            for entry in cp_entries {
                let Some((change, snapshot)) = resolve_change(entry, checkpoint, &current) else {
                    continue;
                };
                let table = snapshot.table();
                if !seen.insert((table, change.id)) {
                    continue;
                }

                let owner = owner_key(&snapshot);
                grouped
                    .entry(owner)
                    .or_default()
                    .entry(table.category())
                    .or_default()
                    .push(change);
                total += 1;
            }
        }

        let owner_names = self.resolve_owner_names(grouped.keys())?;

        let mut groups: Vec<CheckoutGroup> = grouped
            .into_iter()
            .map(|(owner, categories)| {
                let (owner_id, owner_name) = match owner {
                    OwnerKey::Object(id) | OwnerKey::Application(id) => (
                        id,
                        owner_names
                            .get(&owner)
                            .cloned()
                            .unwrap_or_else(|| "(deleted)".to_string()),
                    ),
                    OwnerKey::Global => (0, "(global)".to_string()),
                };
                CheckoutGroup {
                    owner_id,
                    owner_name,
                    categories: categories
                        .into_iter()
                        .map(|(category, rules)| CategoryChanges {
                            category: category.as_str().to_string(),
                            rules,
                        })
                        .collect(),
                }
            })
            .collect();

        groups.sort_by(|a, b| {
            a.owner_name
                .to_lowercase()
                .cmp(&b.owner_name.to_lowercase())
        });

        Ok(CheckoutSummary { groups, total })
    }

    /// Session and checkpoint status for a scope.
    ///
    /// # Errors
    ///
    /// Returns an error only if a query fails.
    pub fn status(
        &self,
        scope_id: Option<i64>,
        application_id: Option<i64>,
    ) -> Result<StatusReport> {
        let active_session = self.store.find_active_checkpoint()?;
        let checkpoints = self.store.list_checkpoints(scope_id, application_id)?;

        let mut by_source: BTreeMap<String, usize> = BTreeMap::new();
        for checkpoint in &checkpoints {
            *by_source
                .entry(checkpoint.source.as_str().to_string())
                .or_insert(0) += 1;
        }

        let active_checkpoints = checkpoints
            .iter()
            .filter(|cp| !cp.status.is_terminal())
            .cloned()
            .collect();

        Ok(StatusReport {
            active_session,
            active_checkpoints,
            summary: StatusSummary {
                total: checkpoints.len(),
                by_source,
            },
        })
    }

    /// Batch-fetch the current rows every non-delete entry needs for name
    /// resolution: one query per table, never one per entry.
    fn fetch_current_rows(
        &self,
        entries: &[UndoLogEntry],
    ) -> Result<HashMap<(EntityTable, i64), RowSnapshot>> {
        let mut wanted: BTreeMap<EntityTable, BTreeSet<i64>> = BTreeMap::new();
        for entry in entries {
            if entry.operation == UndoOperation::Delete {
                // Deletes resolve from their own before-image
                continue;
            }
            let (Ok(table), Ok(key)) = (entry.entity_table(), entry.key()) else {
                debug!(entry = entry.id, "Skipping unreadable undo entry");
                continue;
            };
            wanted.entry(table).or_default().insert(key.id);
        }

        let mut out = HashMap::new();
        for (table, ids) in wanted {
            let ids: Vec<i64> = ids.into_iter().collect();
            for row in self.store.get_rows(table, &ids)? {
                out.insert((table, row.id()), row);
            }
        }
        Ok(out)
    }

    /// Resolve display names for the owning objects/applications of the
    /// checkout groups, batched per table.
    fn resolve_owner_names<'k>(
        &self,
        owners: impl Iterator<Item = &'k OwnerKey>,
    ) -> Result<HashMap<OwnerKey, String>> {
        let mut object_ids = Vec::new();
        let mut application_ids = Vec::new();
        for owner in owners {
            match owner {
                OwnerKey::Object(id) => object_ids.push(*id),
                OwnerKey::Application(id) => application_ids.push(*id),
                OwnerKey::Global => {}
            }
        }

        let mut names = HashMap::new();
        for row in self.store.get_rows(EntityTable::Objects, &object_ids)? {
            names.insert(OwnerKey::Object(row.id()), row.name().to_string());
        }
        for row in self
            .store
            .get_rows(EntityTable::Applications, &application_ids)?
        {
            names.insert(OwnerKey::Application(row.id()), row.name().to_string());
        }
        Ok(names)
    }
}

fn owner_key(snapshot: &RowSnapshot) -> OwnerKey {
    if let Some(object_id) = snapshot.owner_object_id() {
        OwnerKey::Object(object_id)
    } else if let Some(application_id) = snapshot.owner_application_id() {
        OwnerKey::Application(application_id)
    } else {
        OwnerKey::Global
    }
}

/// Resolve one undo entry into a display change, plus the snapshot the
/// resolution came from (needed for ownership grouping).
///
/// Returns `None` when the entry cannot be resolved to a name: the row is
/// gone (and this is not a delete), or the stored record is unreadable.
fn resolve_change(
    entry: &UndoLogEntry,
    checkpoint: &Checkpoint,
    current: &HashMap<(EntityTable, i64), RowSnapshot>,
) -> Option<(RuleChange, RowSnapshot)> {
    let table = match entry.entity_table() {
        Ok(table) => table,
        Err(e) => {
            debug!(entry = entry.id, error = %e, "Dropping entry with unknown table");
            return None;
        }
    };
    let key = match entry.key() {
        Ok(key) => key,
        Err(e) => {
            debug!(entry = entry.id, error = %e, "Dropping entry with unreadable key");
            return None;
        }
    };

    let snapshot = if entry.operation == UndoOperation::Delete {
        match entry.snapshot() {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) | Err(_) => {
                debug!(entry = entry.id, "Dropping delete entry without a readable before-image");
                return None;
            }
        }
    } else {
        current.get(&(table, key.id))?.clone()
    };

    let change = RuleChange {
        id: key.id,
        name: snapshot.name().to_string(),
        rule_type: table.rule_type().to_string(),
        category: table.category().as_str().to_string(),
        operation: entry.operation.display().to_string(),
        checkpoint_id: checkpoint.id.clone(),
        checkpoint_description: checkpoint.description.clone(),
        checkpoint_created_at: checkpoint.created_at,
        checkpoint_source: checkpoint.source.as_str().to_string(),
    };
    Some((change, snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::checkpoint::CheckpointSource;
    use crate::model::entity::ObjectDef;
    use crate::session::capture::{FieldDraft, MutationCapture};
    use crate::session::manager::{BeginRequest, SessionManager};

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

    fn begin_with(
        storage: &mut SqliteStorage,
        scope_id: i64,
        description: &str,
        source: CheckpointSource,
    ) -> String {
        SessionManager::new(storage)
            .begin(BeginRequest {
                scope_id,
                description: Some(description.to_string()),
                user_command: None,
                source,
                application_id: None,
            })
            .unwrap()
            .id
    }

    fn draft(object_id: i64, name: &str) -> FieldDraft {
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

    /// One checkpoint creating an email field shows up in history as
    /// `{name: "email", type: "Field", operation: "Create"}`.
    #[test]
    fn history_resolves_created_field() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = seed_object(&mut storage, "Orders");

        begin_with(&mut storage, object_id, "Add Email field", CheckpointSource::Llm);
        MutationCapture::new(&mut storage)
            .save_field(draft(object_id, "email"))
            .unwrap();
        SessionManager::new(&mut storage).commit().unwrap();

        let history = HistoryProjector::new(&storage)
            .history_with_changes(Some(object_id), None)
            .unwrap();

        assert_eq!(history.len(), 1);
        let rules = &history[0].updated_rules;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "email");
        assert_eq!(rules[0].rule_type, "Field");
        assert_eq!(rules[0].category, "data");
        assert_eq!(rules[0].operation, "Create");
        assert_eq!(
            rules[0].checkpoint_description.as_deref(),
            Some("Add Email field")
        );
    }

    #[test]
    fn delete_entries_resolve_names_from_the_before_image() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = seed_object(&mut storage, "Orders");

        let field_id = MutationCapture::new(&mut storage)
            .save_field(draft(object_id, "obsolete"))
            .unwrap()
            .rows[0]
            .id();

        begin_with(&mut storage, object_id, "Cleanup", CheckpointSource::Api);
        MutationCapture::new(&mut storage).delete_field(field_id).unwrap();
        SessionManager::new(&mut storage).commit().unwrap();

        let history = HistoryProjector::new(&storage)
            .history_with_changes(Some(object_id), None)
            .unwrap();

        // The row is gone, but the summary still names it
        let rules = &history[0].updated_rules;
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].name, "obsolete");
        assert_eq!(rules[0].operation, "Delete");
    }

    #[test]
    fn unresolvable_entries_are_dropped_not_errors() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = seed_object(&mut storage, "Orders");

        begin_with(&mut storage, object_id, "Add field", CheckpointSource::Api);
        let field_id = MutationCapture::new(&mut storage)
            .save_field(draft(object_id, "ghost"))
            .unwrap()
            .rows[0]
            .id();
        SessionManager::new(&mut storage).commit().unwrap();

        // Remove the row behind the engine's back; the insert entry can no
        // longer resolve a current name
        storage
            .conn()
            .execute("DELETE FROM fields WHERE id = ?1", [field_id])
            .unwrap();

        let history = HistoryProjector::new(&storage)
            .history_with_changes(Some(object_id), None)
            .unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].updated_rules.is_empty());
    }

    #[test]
    fn checkout_deduplicates_keeping_the_most_recent_checkpoint() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = seed_object(&mut storage, "Orders");

        let first = begin_with(&mut storage, object_id, "first", CheckpointSource::Api);
        let field_id = MutationCapture::new(&mut storage)
            .save_field(draft(object_id, "email"))
            .unwrap()
            .rows[0]
            .id();
        SessionManager::new(&mut storage).commit().unwrap();

        let second = begin_with(&mut storage, object_id, "second", CheckpointSource::Api);
        let mut update = draft(object_id, "email");
        update.id = Some(field_id);
        update.required = true;
        MutationCapture::new(&mut storage).save_field(update).unwrap();
        SessionManager::new(&mut storage).commit().unwrap();

        let summary = HistoryProjector::new(&storage)
            .checkout_summary(Some(object_id), None)
            .unwrap();

        // Exactly one entry for the row, attributed to the newer checkpoint
        assert_eq!(summary.total, 1);
        let rules: Vec<&RuleChange> = summary
            .groups
            .iter()
            .flat_map(|g| g.categories.iter())
            .flat_map(|c| c.rules.iter())
            .collect();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].checkpoint_id, second);
        assert_ne!(rules[0].checkpoint_id, first);
    }

    #[test]
    fn checkout_groups_sort_alphabetically_by_owner_name() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let zeta = seed_object(&mut storage, "Zeta");
        let alpha = seed_object(&mut storage, "Alpha");

        begin_with(&mut storage, zeta, "both", CheckpointSource::Api);
        MutationCapture::new(&mut storage)
            .save_field(draft(zeta, "z_field"))
            .unwrap();
        MutationCapture::new(&mut storage)
            .save_field(draft(alpha, "a_field"))
            .unwrap();
        SessionManager::new(&mut storage).commit().unwrap();

        let summary = HistoryProjector::new(&storage)
            .checkout_summary(None, None)
            .unwrap();

        assert_eq!(summary.groups.len(), 2);
        assert_eq!(summary.groups[0].owner_name, "Alpha");
        assert_eq!(summary.groups[1].owner_name, "Zeta");
        assert_eq!(summary.groups[0].categories[0].category, "data");
    }

    #[test]
    fn status_counts_by_source() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = seed_object(&mut storage, "Orders");

        begin_with(&mut storage, object_id, "llm work", CheckpointSource::Llm);
        SessionManager::new(&mut storage).commit().unwrap();
        begin_with(&mut storage, object_id, "more llm work", CheckpointSource::Llm);
        SessionManager::new(&mut storage).commit().unwrap();
        begin_with(&mut storage, object_id, "api work", CheckpointSource::Api);

        let report = HistoryProjector::new(&storage)
            .status(Some(object_id), None)
            .unwrap();

        assert_eq!(report.summary.total, 3);
        assert_eq!(report.summary.by_source.get("llm"), Some(&2));
        assert_eq!(report.summary.by_source.get("api"), Some(&1));
        assert!(report.active_session.is_some());
        assert_eq!(report.active_checkpoints.len(), 1);
    }

    #[test]
    fn empty_scope_returns_empty_collections() {
        let storage = SqliteStorage::open_memory().unwrap();
        let projector = HistoryProjector::new(&storage);

        assert!(projector.history_with_changes(Some(1), None).unwrap().is_empty());
        assert_eq!(projector.checkout_summary(Some(1), None).unwrap().total, 0);
        let report = projector.status(Some(1), None).unwrap();
        assert!(report.active_session.is_none());
        assert_eq!(report.summary.total, 0);
    }
}
