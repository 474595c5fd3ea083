//! Builder entity rows and the snapshot tagged union.
//!
//! Each low-code entity (field, view, object, application, theme, decision
//! table) has its own table with typed columns. [`RowSnapshot`] is the tagged
//! union over all of them, keyed by table name, so restore logic can validate
//! a stored snapshot's shape before writing it back instead of trusting an
//! opaque blob.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// The fixed set of entity tables the engine captures mutations for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EntityTable {
    Fields,
    Views,
    Objects,
    Applications,
    Themes,
    DecisionTables,
}

impl EntityTable {
    /// All tables, in display order.
    pub const ALL: [Self; 6] = [
        Self::Fields,
        Self::Views,
        Self::Objects,
        Self::Applications,
        Self::Themes,
        Self::DecisionTables,
    ];

    /// Get the table name for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Fields => "fields",
            Self::Views => "views",
            Self::Objects => "objects",
            Self::Applications => "applications",
            Self::Themes => "themes",
            Self::DecisionTables => "decision_tables",
        }
    }

    /// Parse from a stored table name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fields" => Some(Self::Fields),
            "views" => Some(Self::Views),
            "objects" => Some(Self::Objects),
            "applications" => Some(Self::Applications),
            "themes" => Some(Self::Themes),
            "decision_tables" => Some(Self::DecisionTables),
            _ => None,
        }
    }

    /// Display type name for change summaries (e.g. "Field").
    #[must_use]
    pub const fn rule_type(&self) -> &'static str {
        match self {
            Self::Fields => "Field",
            Self::Views => "View",
            Self::Objects => "Object",
            Self::Applications => "Application",
            Self::Themes => "Theme",
            Self::DecisionTables => "DecisionTable",
        }
    }

    /// Category the table's rules belong to in change summaries.
    #[must_use]
    pub const fn category(&self) -> RuleCategory {
        match self {
            Self::Fields => RuleCategory::Data,
            Self::Views => RuleCategory::Ui,
            Self::Objects | Self::DecisionTables => RuleCategory::Workflow,
            Self::Applications => RuleCategory::App,
            Self::Themes => RuleCategory::Theme,
        }
    }
}

/// Category a rule change is grouped under in checkout summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleCategory {
    Data,
    Ui,
    Workflow,
    App,
    Theme,
}

impl RuleCategory {
    /// Get the string representation for output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Ui => "ui",
            Self::Workflow => "workflow",
            Self::App => "app",
            Self::Theme => "theme",
        }
    }
}

// ── Entity rows ──────────────────────────────────────────────

/// A data field on an object (column in the builder's data model).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub id: i64,
    pub object_id: i64,
    pub name: String,
    pub field_type: String,
    pub required: bool,
    /// Type-specific configuration (choices, formats, validation).
    pub options: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A UI view bound to an object (list, form, detail, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct View {
    pub id: i64,
    pub object_id: i64,
    pub name: String,
    pub view_type: String,
    /// Layout and column configuration.
    pub config: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A workflow object (the owning scope for fields, views, decision tables).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectDef {
    pub id: i64,
    pub application_id: Option<i64>,
    pub name: String,
    pub label: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// An application spanning multiple objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A visual theme, optionally scoped to an application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub id: i64,
    pub application_id: Option<i64>,
    pub name: String,
    pub palette: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A decision table attached to an object's workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTable {
    pub id: i64,
    pub object_id: i64,
    pub name: String,
    pub rules: Option<serde_json::Value>,
    pub created_at: i64,
    pub updated_at: i64,
}

// ── Snapshot tagged union ────────────────────────────────────

/// A whole-row snapshot of one entity, tagged by table.
///
/// This is what the undo log stores in `previous_data` and what restore
/// writes back. Parsing goes through the table's typed struct, so a
/// malformed snapshot fails loudly instead of round-tripping garbage.
/// Serialization is untagged (the bare row); the table tag always travels
/// separately, as `table_name` does in the undo log.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RowSnapshot {
    Field(Field),
    View(View),
    Object(ObjectDef),
    Application(Application),
    Theme(Theme),
    DecisionTable(DecisionTable),
}

impl RowSnapshot {
    /// The table this snapshot belongs to.
    #[must_use]
    pub const fn table(&self) -> EntityTable {
        match self {
            Self::Field(_) => EntityTable::Fields,
            Self::View(_) => EntityTable::Views,
            Self::Object(_) => EntityTable::Objects,
            Self::Application(_) => EntityTable::Applications,
            Self::Theme(_) => EntityTable::Themes,
            Self::DecisionTable(_) => EntityTable::DecisionTables,
        }
    }

    /// The row's primary key.
    #[must_use]
    pub const fn id(&self) -> i64 {
        match self {
            Self::Field(r) => r.id,
            Self::View(r) => r.id,
            Self::Object(r) => r.id,
            Self::Application(r) => r.id,
            Self::Theme(r) => r.id,
            Self::DecisionTable(r) => r.id,
        }
    }

    /// The row's display name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Field(r) => &r.name,
            Self::View(r) => &r.name,
            Self::Object(r) => &r.name,
            Self::Application(r) => &r.name,
            Self::Theme(r) => &r.name,
            Self::DecisionTable(r) => &r.name,
        }
    }

    /// The row's creation timestamp (Unix milliseconds).
    #[must_use]
    pub const fn created_at(&self) -> i64 {
        match self {
            Self::Field(r) => r.created_at,
            Self::View(r) => r.created_at,
            Self::Object(r) => r.created_at,
            Self::Application(r) => r.created_at,
            Self::Theme(r) => r.created_at,
            Self::DecisionTable(r) => r.created_at,
        }
    }

    /// The object this row belongs to, for checkout grouping.
    ///
    /// Objects own themselves; application-level rows (applications,
    /// themes) have no owning object and return `None`.
    #[must_use]
    pub const fn owner_object_id(&self) -> Option<i64> {
        match self {
            Self::Field(r) => Some(r.object_id),
            Self::View(r) => Some(r.object_id),
            Self::DecisionTable(r) => Some(r.object_id),
            Self::Object(r) => Some(r.id),
            Self::Application(_) | Self::Theme(_) => None,
        }
    }

    /// The application this row belongs to, if any.
    #[must_use]
    pub const fn owner_application_id(&self) -> Option<i64> {
        match self {
            Self::Object(r) => r.application_id,
            Self::Theme(r) => r.application_id,
            Self::Application(r) => Some(r.id),
            Self::Field(_) | Self::View(_) | Self::DecisionTable(_) => None,
        }
    }

    /// Parse a stored snapshot for the given table, validating its shape.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SnapshotMalformed`] if the JSON does not match the
    /// table's row schema.
    pub fn from_json(table: EntityTable, json: &str) -> Result<Self> {
        let malformed = |e: serde_json::Error| Error::SnapshotMalformed {
            table: table.as_str().to_string(),
            reason: e.to_string(),
        };

        Ok(match table {
            EntityTable::Fields => Self::Field(serde_json::from_str(json).map_err(malformed)?),
            EntityTable::Views => Self::View(serde_json::from_str(json).map_err(malformed)?),
            EntityTable::Objects => Self::Object(serde_json::from_str(json).map_err(malformed)?),
            EntityTable::Applications => {
                Self::Application(serde_json::from_str(json).map_err(malformed)?)
            }
            EntityTable::Themes => Self::Theme(serde_json::from_str(json).map_err(malformed)?),
            EntityTable::DecisionTables => {
                Self::DecisionTable(serde_json::from_str(json).map_err(malformed)?)
            }
        })
    }

    /// Serialize the snapshot for storage.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let json = match self {
            Self::Field(r) => serde_json::to_string(r)?,
            Self::View(r) => serde_json::to_string(r)?,
            Self::Object(r) => serde_json::to_string(r)?,
            Self::Application(r) => serde_json::to_string(r)?,
            Self::Theme(r) => serde_json::to_string(r)?,
            Self::DecisionTable(r) => serde_json::to_string(r)?,
        };
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_round_trip() {
        for table in EntityTable::ALL {
            assert_eq!(EntityTable::parse(table.as_str()), Some(table));
        }
        assert_eq!(EntityTable::parse("widgets"), None);
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(EntityTable::Fields.category(), RuleCategory::Data);
        assert_eq!(EntityTable::Views.category(), RuleCategory::Ui);
        assert_eq!(EntityTable::Objects.category(), RuleCategory::Workflow);
        assert_eq!(EntityTable::DecisionTables.category(), RuleCategory::Workflow);
        assert_eq!(EntityTable::Applications.category(), RuleCategory::App);
        assert_eq!(EntityTable::Themes.category(), RuleCategory::Theme);
    }

    #[test]
    fn test_snapshot_json_round_trip() {
        let field = Field {
            id: 101,
            object_id: 42,
            name: "email".to_string(),
            field_type: "text".to_string(),
            required: true,
            options: Some(serde_json::json!({"max_length": 255})),
            created_at: 1000,
            updated_at: 2000,
        };

        let snap = RowSnapshot::Field(field.clone());
        let json = snap.to_json().unwrap();
        let parsed = RowSnapshot::from_json(EntityTable::Fields, &json).unwrap();

        assert_eq!(parsed, snap);
        assert_eq!(parsed.id(), 101);
        assert_eq!(parsed.name(), "email");
        assert_eq!(parsed.owner_object_id(), Some(42));
    }

    #[test]
    fn test_snapshot_shape_is_validated() {
        let err = RowSnapshot::from_json(EntityTable::Fields, r#"{"id": "not-a-number"}"#)
            .unwrap_err();
        assert!(matches!(err, Error::SnapshotMalformed { .. }));
    }

    #[test]
    fn test_object_owns_itself() {
        let object = ObjectDef {
            id: 42,
            application_id: Some(7),
            name: "Orders".to_string(),
            label: None,
            created_at: 0,
            updated_at: 0,
        };
        let snap = RowSnapshot::Object(object);
        assert_eq!(snap.owner_object_id(), Some(42));
        assert_eq!(snap.owner_application_id(), Some(7));
    }
}
