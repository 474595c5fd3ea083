//! Mutation capture: the wrapped tool catalog.
//!
//! Every domain mutation ("tool") goes through here. While a session is
//! open, each call snapshots enough pre-state to reverse itself and appends
//! an undo-log entry after the mutation succeeds; with no session open the
//! underlying operation runs unmodified.
//!
//! Insert/update resolution order: an explicit `intent` from the caller
//! wins; otherwise an explicit row id means update; otherwise the store is
//! probed by natural key (name within the owning scope) as a documented
//! fallback.
//!
//! Capture failures never block the mutation. A failed pre-snapshot read or
//! log append is logged, flags the checkpoint `has_gaps`, and surfaces as
//! `CaptureStatus::Degraded` in the outcome: that one change is no longer
//! reversible, and the caller can see it.

use crate::error::{Error, Result};
use crate::model::checkpoint::Checkpoint;
use crate::model::entity::{
    Application, DecisionTable, EntityTable, Field, ObjectDef, RowSnapshot, Theme, View,
};
use crate::model::undo::{PrimaryKey, UndoLogEntry, UndoOperation};
use crate::storage::{EntityStore, SqliteStorage};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// The fixed tool catalog, in dispatch order.
pub const TOOLS: &[&str] = &[
    "save_field",
    "save_fields",
    "delete_field",
    "save_view",
    "delete_view",
    "save_object",
    "delete_object",
    "save_application",
    "delete_application",
    "save_theme",
    "delete_theme",
    "save_decision_table",
    "delete_decision_table",
];

/// Explicit caller intent for a save, overriding the id/probe heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteIntent {
    Insert,
    Update,
}

/// How the capture side of a tool call went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureStatus {
    /// Every change was logged and is reversible
    Recorded,
    /// No session was open; the mutation ran uncaptured
    NoSession,
    /// At least one change could not be captured; reversibility is degraded
    Degraded,
}

/// Result of one tool invocation.
#[derive(Debug, Serialize)]
pub struct ToolOutcome {
    pub tool: &'static str,
    /// The affected rows (created/updated state, or the deleted row)
    pub rows: Vec<RowSnapshot>,
    pub capture: CaptureStatus,
}

// ── Tool payloads ────────────────────────────────────────────

fn default_field_type() -> String {
    "text".to_string()
}

fn default_view_type() -> String {
    "list".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDraft {
    #[serde(default)]
    pub id: Option<i64>,
    pub object_id: i64,
    pub name: String,
    #[serde(default = "default_field_type")]
    pub field_type: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
    #[serde(default)]
    pub intent: Option<WriteIntent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewDraft {
    #[serde(default)]
    pub id: Option<i64>,
    pub object_id: i64,
    pub name: String,
    #[serde(default = "default_view_type")]
    pub view_type: String,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
    #[serde(default)]
    pub intent: Option<WriteIntent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObjectDraft {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub application_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub intent: Option<WriteIntent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApplicationDraft {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub intent: Option<WriteIntent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThemeDraft {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub application_id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub palette: Option<serde_json::Value>,
    #[serde(default)]
    pub intent: Option<WriteIntent>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DecisionTableDraft {
    #[serde(default)]
    pub id: Option<i64>,
    pub object_id: i64,
    pub name: String,
    #[serde(default)]
    pub rules: Option<serde_json::Value>,
    #[serde(default)]
    pub intent: Option<WriteIntent>,
}

/// Payload for the delete tools.
#[derive(Debug, Clone, Deserialize)]
pub struct DeletePayload {
    pub id: i64,
}

// ── Capture wrapper ──────────────────────────────────────────

/// Wraps the tool catalog with undo-log capture.
pub struct MutationCapture<'a> {
    store: &'a mut SqliteStorage,
}

impl<'a> MutationCapture<'a> {
    #[must_use]
    pub fn new(store: &'a mut SqliteStorage) -> Self {
        Self { store }
    }

    /// Dispatch a tool by name with a JSON payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTool`] for a name outside the catalog and
    /// [`Error::InvalidArgument`] for a payload that does not parse.
    pub fn run(&mut self, tool: &str, payload: &str) -> Result<ToolOutcome> {
        fn parse<T: serde::de::DeserializeOwned>(tool: &str, payload: &str) -> Result<T> {
            serde_json::from_str(payload)
                .map_err(|e| Error::InvalidArgument(format!("bad payload for {tool}: {e}")))
        }

        match tool {
            "save_field" => self.save_field(parse(tool, payload)?),
            "save_fields" => self.save_fields(parse(tool, payload)?),
            "delete_field" => {
                let p: DeletePayload = parse(tool, payload)?;
                self.delete_field(p.id)
            }
            "save_view" => self.save_view(parse(tool, payload)?),
            "delete_view" => {
                let p: DeletePayload = parse(tool, payload)?;
                self.delete_view(p.id)
            }
            "save_object" => self.save_object(parse(tool, payload)?),
            "delete_object" => {
                let p: DeletePayload = parse(tool, payload)?;
                self.delete_object(p.id)
            }
            "save_application" => self.save_application(parse(tool, payload)?),
            "delete_application" => {
                let p: DeletePayload = parse(tool, payload)?;
                self.delete_application(p.id)
            }
            "save_theme" => self.save_theme(parse(tool, payload)?),
            "delete_theme" => {
                let p: DeletePayload = parse(tool, payload)?;
                self.delete_theme(p.id)
            }
            "save_decision_table" => self.save_decision_table(parse(tool, payload)?),
            "delete_decision_table" => {
                let p: DeletePayload = parse(tool, payload)?;
                self.delete_decision_table(p.id)
            }
            _ => {
                let catalog: Vec<String> = TOOLS.iter().map(ToString::to_string).collect();
                Err(Error::UnknownTool {
                    name: tool.to_string(),
                    similar: crate::validate::find_similar_ids(tool, &catalog, 3),
                })
            }
        }
    }

    // ── Save tools ───────────────────────────────────────────

    /// Create or update a single field.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying mutation fails.
    pub fn save_field(&mut self, draft: FieldDraft) -> Result<ToolOutcome> {
        self.save_fields_inner("save_field", vec![draft])
    }

    /// Create or update a batch of fields, one undo entry per row in
    /// input order.
    ///
    /// # Errors
    ///
    /// Returns an error if any row's mutation fails; rows already written
    /// stay written (their entries are logged, so rollback covers them).
    pub fn save_fields(&mut self, drafts: Vec<FieldDraft>) -> Result<ToolOutcome> {
        self.save_fields_inner("save_fields", drafts)
    }

    fn save_fields_inner(
        &mut self,
        tool: &'static str,
        drafts: Vec<FieldDraft>,
    ) -> Result<ToolOutcome> {
        let session = self.store.find_active_checkpoint()?;
        let mut rows = Vec::with_capacity(drafts.len());
        let mut degraded = false;

        for draft in drafts {
            let target = self.resolve_target(
                EntityTable::Fields,
                draft.id,
                Some(draft.object_id),
                &draft.name,
                draft.intent,
            )?;
            let now = chrono::Utc::now().timestamp_millis();

            match target {
                Some(id) => {
                    let pre = self.snapshot_for_update(
                        session.as_ref(),
                        EntityTable::Fields,
                        id,
                        &mut degraded,
                    )?;
                    let row = RowSnapshot::Field(Field {
                        id,
                        object_id: draft.object_id,
                        name: draft.name,
                        field_type: draft.field_type,
                        required: draft.required,
                        options: draft.options,
                        created_at: pre.as_ref().map_or(0, RowSnapshot::created_at),
                        updated_at: now,
                    });
                    self.apply_update(&row)?;
                    if let Some(cp) = &session {
                        self.log_entry(
                            &cp.id,
                            UndoOperation::Update,
                            EntityTable::Fields,
                            id,
                            pre.as_ref(),
                            &mut degraded,
                        );
                    }
                    rows.push(row);
                }
                None => {
                    let mut field = Field {
                        id: 0,
                        object_id: draft.object_id,
                        name: draft.name,
                        field_type: draft.field_type,
                        required: draft.required,
                        options: draft.options,
                        created_at: now,
                        updated_at: now,
                    };
                    field.id = self.store.insert_row(&RowSnapshot::Field(field.clone()))?;
                    if let Some(cp) = &session {
                        self.log_entry(
                            &cp.id,
                            UndoOperation::Insert,
                            EntityTable::Fields,
                            field.id,
                            None,
                            &mut degraded,
                        );
                    }
                    rows.push(RowSnapshot::Field(field));
                }
            }
        }

        self.finish(tool, session.as_ref(), degraded)?;
        Ok(ToolOutcome {
            tool,
            rows,
            capture: capture_status(session.as_ref(), degraded),
        })
    }

    /// Create or update a view.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying mutation fails.
    pub fn save_view(&mut self, draft: ViewDraft) -> Result<ToolOutcome> {
        let tool = "save_view";
        let session = self.store.find_active_checkpoint()?;
        let mut degraded = false;

        let target = self.resolve_target(
            EntityTable::Views,
            draft.id,
            Some(draft.object_id),
            &draft.name,
            draft.intent,
        )?;
        let now = chrono::Utc::now().timestamp_millis();

        let row = match target {
            Some(id) => {
                let pre =
                    self.snapshot_for_update(session.as_ref(), EntityTable::Views, id, &mut degraded)?;
                let row = RowSnapshot::View(View {
                    id,
                    object_id: draft.object_id,
                    name: draft.name,
                    view_type: draft.view_type,
                    config: draft.config,
                    created_at: pre.as_ref().map_or(0, RowSnapshot::created_at),
                    updated_at: now,
                });
                self.apply_update(&row)?;
                if let Some(cp) = &session {
                    self.log_entry(
                        &cp.id,
                        UndoOperation::Update,
                        EntityTable::Views,
                        id,
                        pre.as_ref(),
                        &mut degraded,
                    );
                }
                row
            }
            None => {
                let mut view = View {
                    id: 0,
                    object_id: draft.object_id,
                    name: draft.name,
                    view_type: draft.view_type,
                    config: draft.config,
                    created_at: now,
                    updated_at: now,
                };
                view.id = self.store.insert_row(&RowSnapshot::View(view.clone()))?;
                if let Some(cp) = &session {
                    self.log_entry(
                        &cp.id,
                        UndoOperation::Insert,
                        EntityTable::Views,
                        view.id,
                        None,
                        &mut degraded,
                    );
                }
                RowSnapshot::View(view)
            }
        };

        self.finish(tool, session.as_ref(), degraded)?;
        Ok(ToolOutcome {
            tool,
            rows: vec![row],
            capture: capture_status(session.as_ref(), degraded),
        })
    }

    /// Create or update a workflow object.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying mutation fails.
    pub fn save_object(&mut self, draft: ObjectDraft) -> Result<ToolOutcome> {
        let tool = "save_object";
        let session = self.store.find_active_checkpoint()?;
        let mut degraded = false;

        let target = self.resolve_target(
            EntityTable::Objects,
            draft.id,
            draft.application_id,
            &draft.name,
            draft.intent,
        )?;
        let now = chrono::Utc::now().timestamp_millis();

        let row = match target {
            Some(id) => {
                let pre = self.snapshot_for_update(
                    session.as_ref(),
                    EntityTable::Objects,
                    id,
                    &mut degraded,
                )?;
                let row = RowSnapshot::Object(ObjectDef {
                    id,
                    application_id: draft.application_id,
                    name: draft.name,
                    label: draft.label,
                    created_at: pre.as_ref().map_or(0, RowSnapshot::created_at),
                    updated_at: now,
                });
                self.apply_update(&row)?;
                if let Some(cp) = &session {
                    self.log_entry(
                        &cp.id,
                        UndoOperation::Update,
                        EntityTable::Objects,
                        id,
                        pre.as_ref(),
                        &mut degraded,
                    );
                }
                row
            }
            None => {
                let mut object = ObjectDef {
                    id: 0,
                    application_id: draft.application_id,
                    name: draft.name,
                    label: draft.label,
                    created_at: now,
                    updated_at: now,
                };
                object.id = self.store.insert_row(&RowSnapshot::Object(object.clone()))?;
                if let Some(cp) = &session {
                    self.log_entry(
                        &cp.id,
                        UndoOperation::Insert,
                        EntityTable::Objects,
                        object.id,
                        None,
                        &mut degraded,
                    );
                }
                RowSnapshot::Object(object)
            }
        };

        self.finish(tool, session.as_ref(), degraded)?;
        Ok(ToolOutcome {
            tool,
            rows: vec![row],
            capture: capture_status(session.as_ref(), degraded),
        })
    }

    /// Create or update an application.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying mutation fails.
    pub fn save_application(&mut self, draft: ApplicationDraft) -> Result<ToolOutcome> {
        let tool = "save_application";
        let session = self.store.find_active_checkpoint()?;
        let mut degraded = false;

        let target = self.resolve_target(
            EntityTable::Applications,
            draft.id,
            None,
            &draft.name,
            draft.intent,
        )?;
        let now = chrono::Utc::now().timestamp_millis();

        let row = match target {
            Some(id) => {
                let pre = self.snapshot_for_update(
                    session.as_ref(),
                    EntityTable::Applications,
                    id,
                    &mut degraded,
                )?;
                let row = RowSnapshot::Application(Application {
                    id,
                    name: draft.name,
                    description: draft.description,
                    created_at: pre.as_ref().map_or(0, RowSnapshot::created_at),
                    updated_at: now,
                });
                self.apply_update(&row)?;
                if let Some(cp) = &session {
                    self.log_entry(
                        &cp.id,
                        UndoOperation::Update,
                        EntityTable::Applications,
                        id,
                        pre.as_ref(),
                        &mut degraded,
                    );
                }
                row
            }
            None => {
                let mut application = Application {
                    id: 0,
                    name: draft.name,
                    description: draft.description,
                    created_at: now,
                    updated_at: now,
                };
                application.id = self
                    .store
                    .insert_row(&RowSnapshot::Application(application.clone()))?;
                if let Some(cp) = &session {
                    self.log_entry(
                        &cp.id,
                        UndoOperation::Insert,
                        EntityTable::Applications,
                        application.id,
                        None,
                        &mut degraded,
                    );
                }
                RowSnapshot::Application(application)
            }
        };

        self.finish(tool, session.as_ref(), degraded)?;
        Ok(ToolOutcome {
            tool,
            rows: vec![row],
            capture: capture_status(session.as_ref(), degraded),
        })
    }

    /// Create or update a theme.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying mutation fails.
    pub fn save_theme(&mut self, draft: ThemeDraft) -> Result<ToolOutcome> {
        let tool = "save_theme";
        let session = self.store.find_active_checkpoint()?;
        let mut degraded = false;

        let target = self.resolve_target(
            EntityTable::Themes,
            draft.id,
            draft.application_id,
            &draft.name,
            draft.intent,
        )?;
        let now = chrono::Utc::now().timestamp_millis();

        let row = match target {
            Some(id) => {
                let pre =
                    self.snapshot_for_update(session.as_ref(), EntityTable::Themes, id, &mut degraded)?;
                let row = RowSnapshot::Theme(Theme {
                    id,
                    application_id: draft.application_id,
                    name: draft.name,
                    palette: draft.palette,
                    created_at: pre.as_ref().map_or(0, RowSnapshot::created_at),
                    updated_at: now,
                });
                self.apply_update(&row)?;
                if let Some(cp) = &session {
                    self.log_entry(
                        &cp.id,
                        UndoOperation::Update,
                        EntityTable::Themes,
                        id,
                        pre.as_ref(),
                        &mut degraded,
                    );
                }
                row
            }
            None => {
                let mut theme = Theme {
                    id: 0,
                    application_id: draft.application_id,
                    name: draft.name,
                    palette: draft.palette,
                    created_at: now,
                    updated_at: now,
                };
                theme.id = self.store.insert_row(&RowSnapshot::Theme(theme.clone()))?;
                if let Some(cp) = &session {
                    self.log_entry(
                        &cp.id,
                        UndoOperation::Insert,
                        EntityTable::Themes,
                        theme.id,
                        None,
                        &mut degraded,
                    );
                }
                RowSnapshot::Theme(theme)
            }
        };

        self.finish(tool, session.as_ref(), degraded)?;
        Ok(ToolOutcome {
            tool,
            rows: vec![row],
            capture: capture_status(session.as_ref(), degraded),
        })
    }

    /// Create or update a decision table.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying mutation fails.
    pub fn save_decision_table(&mut self, draft: DecisionTableDraft) -> Result<ToolOutcome> {
        let tool = "save_decision_table";
        let session = self.store.find_active_checkpoint()?;
        let mut degraded = false;

        let target = self.resolve_target(
            EntityTable::DecisionTables,
            draft.id,
            Some(draft.object_id),
            &draft.name,
            draft.intent,
        )?;
        let now = chrono::Utc::now().timestamp_millis();

        let row = match target {
            Some(id) => {
                let pre = self.snapshot_for_update(
                    session.as_ref(),
                    EntityTable::DecisionTables,
                    id,
                    &mut degraded,
                )?;
                let row = RowSnapshot::DecisionTable(DecisionTable {
                    id,
                    object_id: draft.object_id,
                    name: draft.name,
                    rules: draft.rules,
                    created_at: pre.as_ref().map_or(0, RowSnapshot::created_at),
                    updated_at: now,
                });
                self.apply_update(&row)?;
                if let Some(cp) = &session {
                    self.log_entry(
                        &cp.id,
                        UndoOperation::Update,
                        EntityTable::DecisionTables,
                        id,
                        pre.as_ref(),
                        &mut degraded,
                    );
                }
                row
            }
            None => {
                let mut table = DecisionTable {
                    id: 0,
                    object_id: draft.object_id,
                    name: draft.name,
                    rules: draft.rules,
                    created_at: now,
                    updated_at: now,
                };
                table.id = self
                    .store
                    .insert_row(&RowSnapshot::DecisionTable(table.clone()))?;
                if let Some(cp) = &session {
                    self.log_entry(
                        &cp.id,
                        UndoOperation::Insert,
                        EntityTable::DecisionTables,
                        table.id,
                        None,
                        &mut degraded,
                    );
                }
                RowSnapshot::DecisionTable(table)
            }
        };

        self.finish(tool, session.as_ref(), degraded)?;
        Ok(ToolOutcome {
            tool,
            rows: vec![row],
            capture: capture_status(session.as_ref(), degraded),
        })
    }

    // ── Delete tools ─────────────────────────────────────────

    /// Delete a field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntityNotFound`] if the row does not exist.
    pub fn delete_field(&mut self, id: i64) -> Result<ToolOutcome> {
        self.delete_one("delete_field", EntityTable::Fields, id)
    }

    /// Delete a view.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntityNotFound`] if the row does not exist.
    pub fn delete_view(&mut self, id: i64) -> Result<ToolOutcome> {
        self.delete_one("delete_view", EntityTable::Views, id)
    }

    /// Delete a workflow object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntityNotFound`] if the row does not exist.
    pub fn delete_object(&mut self, id: i64) -> Result<ToolOutcome> {
        self.delete_one("delete_object", EntityTable::Objects, id)
    }

    /// Delete an application.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntityNotFound`] if the row does not exist.
    pub fn delete_application(&mut self, id: i64) -> Result<ToolOutcome> {
        self.delete_one("delete_application", EntityTable::Applications, id)
    }

    /// Delete a theme.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntityNotFound`] if the row does not exist.
    pub fn delete_theme(&mut self, id: i64) -> Result<ToolOutcome> {
        self.delete_one("delete_theme", EntityTable::Themes, id)
    }

    /// Delete a decision table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntityNotFound`] if the row does not exist.
    pub fn delete_decision_table(&mut self, id: i64) -> Result<ToolOutcome> {
        self.delete_one("delete_decision_table", EntityTable::DecisionTables, id)
    }

    fn delete_one(
        &mut self,
        tool: &'static str,
        table: EntityTable,
        id: i64,
    ) -> Result<ToolOutcome> {
        let session = self.store.find_active_checkpoint()?;
        let mut degraded = false;

        // Snapshot immediately before deletion; without it the delete is
        // unreversible, but it still proceeds.
        let pre = if session.is_some() {
            match self.store.get_row(table, id) {
                Ok(Some(row)) => Some(row),
                Ok(None) => {
                    return Err(Error::EntityNotFound {
                        table: table.as_str().to_string(),
                        id,
                    });
                }
                Err(e) => {
                    warn!(table = table.as_str(), id, error = %e,
                          "Pre-delete snapshot failed; this delete will not be reversible");
                    degraded = true;
                    None
                }
            }
        } else {
            None
        };

        let affected = self.store.delete_row(table, id)?;
        if affected == 0 {
            return Err(Error::EntityNotFound {
                table: table.as_str().to_string(),
                id,
            });
        }

        if let Some(cp) = &session {
            if let Some(p) = &pre {
                self.log_entry(&cp.id, UndoOperation::Delete, table, id, Some(p), &mut degraded);
            }
        }

        self.finish(tool, session.as_ref(), degraded)?;
        Ok(ToolOutcome {
            tool,
            rows: pre.into_iter().collect(),
            capture: capture_status(session.as_ref(), degraded),
        })
    }

    // ── Shared capture steps ─────────────────────────────────

    /// Resolve whether a save is logically an insert or an update.
    ///
    /// Returns the target row id for an update, `None` for an insert.
    fn resolve_target(
        &self,
        table: EntityTable,
        id: Option<i64>,
        owner: Option<i64>,
        name: &str,
        intent: Option<WriteIntent>,
    ) -> Result<Option<i64>> {
        if intent == Some(WriteIntent::Insert) {
            return Ok(None);
        }

        if let Some(id) = id {
            return Ok(Some(id));
        }

        let probed = self.store.find_id_by_name(table, owner, name)?;
        if probed.is_none() && intent == Some(WriteIntent::Update) {
            return Err(Error::InvalidArgument(format!(
                "update intent for {} '{name}' but no existing row matches",
                table.as_str()
            )));
        }
        Ok(probed)
    }

    /// Read the pre-state snapshot for an update.
    ///
    /// With no session open there is nothing to capture. A read failure is
    /// non-fatal: the update proceeds, but this change loses reversibility.
    fn snapshot_for_update(
        &self,
        session: Option<&Checkpoint>,
        table: EntityTable,
        id: i64,
        degraded: &mut bool,
    ) -> Result<Option<RowSnapshot>> {
        if session.is_none() {
            return Ok(None);
        }

        match self.store.get_row(table, id) {
            Ok(Some(row)) => Ok(Some(row)),
            Ok(None) => Err(Error::EntityNotFound {
                table: table.as_str().to_string(),
                id,
            }),
            Err(e) => {
                warn!(table = table.as_str(), id, error = %e,
                      "Pre-update snapshot failed; this update will not be reversible");
                *degraded = true;
                Ok(None)
            }
        }
    }

    fn apply_update(&mut self, row: &RowSnapshot) -> Result<()> {
        let affected = self.store.update_row(row)?;
        if affected == 0 {
            return Err(Error::EntityNotFound {
                table: row.table().as_str().to_string(),
                id: row.id(),
            });
        }
        Ok(())
    }

    /// Append one undo-log entry after the mutation succeeded.
    ///
    /// Append failures degrade the checkpoint instead of failing the tool.
    fn log_entry(
        &mut self,
        checkpoint_id: &str,
        operation: UndoOperation,
        table: EntityTable,
        id: i64,
        pre: Option<&RowSnapshot>,
        degraded: &mut bool,
    ) {
        let previous = match pre.map(RowSnapshot::to_json).transpose() {
            Ok(json) => json,
            Err(e) => {
                warn!(table = table.as_str(), id, error = %e,
                      "Snapshot serialization failed; this change will not be reversible");
                *degraded = true;
                return;
            }
        };

        let entry = UndoLogEntry::new(checkpoint_id, operation, table, PrimaryKey::new(id), previous);
        if let Err(e) = self.store.append_undo_entry(&entry) {
            warn!(table = table.as_str(), id, error = %e,
                  "Undo-log append failed; this change will not be reversible");
            *degraded = true;
        }
    }

    /// Post-call bookkeeping: flag gaps and record the tool name, once per
    /// invocation.
    fn finish(
        &mut self,
        tool: &str,
        session: Option<&Checkpoint>,
        degraded: bool,
    ) -> Result<()> {
        if let Some(cp) = session {
            if degraded {
                self.store.mark_checkpoint_gaps(&cp.id)?;
            }
            self.store.append_tool_executed(&cp.id, tool)?;
        }
        Ok(())
    }
}

const fn capture_status(session: Option<&Checkpoint>, degraded: bool) -> CaptureStatus {
    match (session, degraded) {
        (None, _) => CaptureStatus::NoSession,
        (Some(_), true) => CaptureStatus::Degraded,
        (Some(_), false) => CaptureStatus::Recorded,
    }
}
