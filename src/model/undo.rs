//! Undo-log entry model.
//!
//! An undo-log entry is a single reversible mutation record tied to one
//! checkpoint: the operation, the affected row's primary key, and the full
//! before-image where one exists. Entries are immutable once written.

use crate::error::{Error, Result};
use crate::model::entity::{EntityTable, RowSnapshot};
use serde::{Deserialize, Serialize};

/// The mutation kind an entry reverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UndoOperation {
    Insert,
    Update,
    Delete,
}

impl UndoOperation {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    /// Parse from a stored operation string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "insert" => Some(Self::Insert),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            _ => None,
        }
    }

    /// Display verb for change summaries.
    #[must_use]
    pub const fn display(&self) -> &'static str {
        match self {
            Self::Insert => "Create",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }
}

/// Structured identifier of the affected row.
///
/// Minimally `{"id": n}`; stored as JSON so wider keys can be added
/// without a schema change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryKey {
    pub id: i64,
}

impl PrimaryKey {
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self { id }
    }
}

/// A single undo-log record.
///
/// `primary_key` and `previous_data` are kept as raw JSON text the way they
/// sit in the database; the typed accessors parse on demand so each consumer
/// chooses its own failure policy (history drops and logs, restore fails
/// hard).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoLogEntry {
    /// Row id (assigned by the database on append)
    pub id: i64,

    /// Owning checkpoint
    pub checkpoint_id: String,

    /// The mutation this entry reverses
    pub operation: UndoOperation,

    /// Target entity table
    pub table_name: String,

    /// JSON-encoded [`PrimaryKey`]
    pub primary_key: String,

    /// Full before-image JSON; `None` for inserts (there is no before state)
    pub previous_data: Option<String>,

    /// Append timestamp (Unix milliseconds), orders entries within and
    /// across checkpoints
    pub created_at: i64,
}

impl UndoLogEntry {
    /// Create a new entry (id will be assigned by the database).
    #[must_use]
    pub fn new(
        checkpoint_id: &str,
        operation: UndoOperation,
        table: EntityTable,
        key: PrimaryKey,
        previous_data: Option<String>,
    ) -> Self {
        Self {
            id: 0,
            checkpoint_id: checkpoint_id.to_string(),
            operation,
            table_name: table.as_str().to_string(),
            primary_key: serde_json::json!({ "id": key.id }).to_string(),
            previous_data,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Resolve the entry's table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SnapshotMalformed`] if the stored table name is not
    /// part of the entity catalog.
    pub fn entity_table(&self) -> Result<EntityTable> {
        EntityTable::parse(&self.table_name).ok_or_else(|| Error::SnapshotMalformed {
            table: self.table_name.clone(),
            reason: "unknown entity table".to_string(),
        })
    }

    /// Parse the entry's primary key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SnapshotMalformed`] if the stored JSON is not a
    /// valid primary key.
    pub fn key(&self) -> Result<PrimaryKey> {
        serde_json::from_str(&self.primary_key).map_err(|e| Error::SnapshotMalformed {
            table: self.table_name.clone(),
            reason: format!("bad primary key: {e}"),
        })
    }

    /// Parse the before-image, validating it against the table's row shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SnapshotMalformed`] if the table is unknown or the
    /// stored JSON does not match its row schema.
    pub fn snapshot(&self) -> Result<Option<RowSnapshot>> {
        let table = self.entity_table()?;
        match &self.previous_data {
            None => Ok(None),
            Some(json) => RowSnapshot::from_json(table, json).map(Some),
        }
    }
}
