//! Entity row storage (the `EntityStore` seam).
//!
//! The engine treats the underlying relational store as an external
//! collaborator offering ordinary row CRUD with primary-key lookup. This
//! module defines that seam as a trait and implements it over the same
//! SQLite connection everything else uses.

use crate::error::{Error, Result};
use crate::model::entity::{
    Application, DecisionTable, EntityTable, Field, ObjectDef, RowSnapshot, Theme, View,
};
use rusqlite::Row;
use tracing::warn;

/// Row CRUD over the builder's entity tables.
///
/// `insert_row_with_id` exists solely for delete-inverse replay: restore
/// must resurrect a deleted row under its original primary key.
pub trait EntityStore {
    /// Fetch one row by primary key.
    fn get_row(&self, table: EntityTable, id: i64) -> Result<Option<RowSnapshot>>;

    /// Look up a row id by natural key (`name` within the owning scope).
    ///
    /// `owner` is the object id for fields/views/decision tables and the
    /// (optional) application id for objects/themes; applications ignore it.
    fn find_id_by_name(&self, table: EntityTable, owner: Option<i64>, name: &str)
        -> Result<Option<i64>>;

    /// Insert a row, letting the database assign the id. Returns the new id.
    fn insert_row(&mut self, row: &RowSnapshot) -> Result<i64>;

    /// Insert a row under its snapshot id (restore path).
    fn insert_row_with_id(&mut self, row: &RowSnapshot) -> Result<()>;

    /// Write a full row back by primary key. Returns rows affected;
    /// `created_at` is never touched.
    fn update_row(&mut self, row: &RowSnapshot) -> Result<usize>;

    /// Delete a row by primary key. Returns rows affected (0 if already gone).
    fn delete_row(&mut self, table: EntityTable, id: i64) -> Result<usize>;

    /// Batch-fetch rows by id in one query.
    ///
    /// Lenient: rows that fail to parse are skipped with a warning. The
    /// only consumer is display-name resolution.
    fn get_rows(&self, table: EntityTable, ids: &[i64]) -> Result<Vec<RowSnapshot>>;
}

// ── Column lists and row mappers ─────────────────────────────

const FIELD_COLS: &str = "id, object_id, name, field_type, required, options, created_at, updated_at";
const VIEW_COLS: &str = "id, object_id, name, view_type, config, created_at, updated_at";
const OBJECT_COLS: &str = "id, application_id, name, label, created_at, updated_at";
const APPLICATION_COLS: &str = "id, name, description, created_at, updated_at";
const THEME_COLS: &str = "id, application_id, name, palette, created_at, updated_at";
const DECISION_TABLE_COLS: &str = "id, object_id, name, rules, created_at, updated_at";

const fn select_cols(table: EntityTable) -> &'static str {
    match table {
        EntityTable::Fields => FIELD_COLS,
        EntityTable::Views => VIEW_COLS,
        EntityTable::Objects => OBJECT_COLS,
        EntityTable::Applications => APPLICATION_COLS,
        EntityTable::Themes => THEME_COLS,
        EntityTable::DecisionTables => DECISION_TABLE_COLS,
    }
}

/// Read a nullable JSON text column, failing loudly on malformed content.
fn json_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(None),
        Some(s) => serde_json::from_str(&s).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, e.into())
        }),
    }
}

fn snapshot_from_row(table: EntityTable, row: &Row<'_>) -> rusqlite::Result<RowSnapshot> {
    Ok(match table {
        EntityTable::Fields => RowSnapshot::Field(Field {
            id: row.get(0)?,
            object_id: row.get(1)?,
            name: row.get(2)?,
            field_type: row.get(3)?,
            required: row.get(4)?,
            options: json_col(row, 5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        }),
        EntityTable::Views => RowSnapshot::View(View {
            id: row.get(0)?,
            object_id: row.get(1)?,
            name: row.get(2)?,
            view_type: row.get(3)?,
            config: json_col(row, 4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        }),
        EntityTable::Objects => RowSnapshot::Object(ObjectDef {
            id: row.get(0)?,
            application_id: row.get(1)?,
            name: row.get(2)?,
            label: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        }),
        EntityTable::Applications => RowSnapshot::Application(Application {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        }),
        EntityTable::Themes => RowSnapshot::Theme(Theme {
            id: row.get(0)?,
            application_id: row.get(1)?,
            name: row.get(2)?,
            palette: json_col(row, 3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        }),
        EntityTable::DecisionTables => RowSnapshot::DecisionTable(DecisionTable {
            id: row.get(0)?,
            object_id: row.get(1)?,
            name: row.get(2)?,
            rules: json_col(row, 3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        }),
    })
}

fn json_param(value: Option<&serde_json::Value>) -> Result<Option<String>> {
    value.map(|v| serde_json::to_string(v).map_err(Error::from)).transpose()
}

// ── SQLite implementation ────────────────────────────────────

impl EntityStore for super::sqlite::SqliteStorage {
    fn get_row(&self, table: EntityTable, id: i64) -> Result<Option<RowSnapshot>> {
        use rusqlite::OptionalExtension;

        let sql = format!(
            "SELECT {} FROM {} WHERE id = ?1",
            select_cols(table),
            table.as_str()
        );
        let snapshot = self
            .conn()
            .query_row(&sql, [id], |row| snapshot_from_row(table, row))
            .optional()?;
        Ok(snapshot)
    }

    fn find_id_by_name(
        &self,
        table: EntityTable,
        owner: Option<i64>,
        name: &str,
    ) -> Result<Option<i64>> {
        use rusqlite::OptionalExtension;

        let id = match table {
            EntityTable::Fields | EntityTable::Views | EntityTable::DecisionTables => {
                let Some(object_id) = owner else {
                    return Err(Error::InvalidArgument(format!(
                        "{} probe requires an owning object id",
                        table.as_str()
                    )));
                };
                let sql = format!(
                    "SELECT id FROM {} WHERE object_id = ?1 AND name = ?2",
                    table.as_str()
                );
                self.conn()
                    .query_row(&sql, rusqlite::params![object_id, name], |row| row.get(0))
                    .optional()?
            }
            EntityTable::Objects | EntityTable::Themes => {
                let sql = format!(
                    "SELECT id FROM {} WHERE name = ?1 AND application_id IS ?2",
                    table.as_str()
                );
                self.conn()
                    .query_row(&sql, rusqlite::params![name, owner], |row| row.get(0))
                    .optional()?
            }
            EntityTable::Applications => self
                .conn()
                .query_row(
                    "SELECT id FROM applications WHERE name = ?1",
                    [name],
                    |row| row.get(0),
                )
                .optional()?,
        };
        Ok(id)
    }

    fn insert_row(&mut self, row: &RowSnapshot) -> Result<i64> {
        match row {
            RowSnapshot::Field(r) => {
                self.conn().execute(
                    "INSERT INTO fields (object_id, name, field_type, required, options, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        r.object_id,
                        r.name,
                        r.field_type,
                        r.required,
                        json_param(r.options.as_ref())?,
                        r.created_at,
                        r.updated_at,
                    ],
                )?;
            }
            RowSnapshot::View(r) => {
                self.conn().execute(
                    "INSERT INTO views (object_id, name, view_type, config, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        r.object_id,
                        r.name,
                        r.view_type,
                        json_param(r.config.as_ref())?,
                        r.created_at,
                        r.updated_at,
                    ],
                )?;
            }
            RowSnapshot::Object(r) => {
                self.conn().execute(
                    "INSERT INTO objects (application_id, name, label, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![r.application_id, r.name, r.label, r.created_at, r.updated_at],
                )?;
            }
            RowSnapshot::Application(r) => {
                self.conn().execute(
                    "INSERT INTO applications (name, description, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![r.name, r.description, r.created_at, r.updated_at],
                )?;
            }
            RowSnapshot::Theme(r) => {
                self.conn().execute(
                    "INSERT INTO themes (application_id, name, palette, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        r.application_id,
                        r.name,
                        json_param(r.palette.as_ref())?,
                        r.created_at,
                        r.updated_at,
                    ],
                )?;
            }
            RowSnapshot::DecisionTable(r) => {
                self.conn().execute(
                    "INSERT INTO decision_tables (object_id, name, rules, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![
                        r.object_id,
                        r.name,
                        json_param(r.rules.as_ref())?,
                        r.created_at,
                        r.updated_at,
                    ],
                )?;
            }
        }
        Ok(self.conn().last_insert_rowid())
    }

    fn insert_row_with_id(&mut self, row: &RowSnapshot) -> Result<()> {
        match row {
            RowSnapshot::Field(r) => {
                self.conn().execute(
                    "INSERT INTO fields (id, object_id, name, field_type, required, options, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    rusqlite::params![
                        r.id,
                        r.object_id,
                        r.name,
                        r.field_type,
                        r.required,
                        json_param(r.options.as_ref())?,
                        r.created_at,
                        r.updated_at,
                    ],
                )?;
            }
            RowSnapshot::View(r) => {
                self.conn().execute(
                    "INSERT INTO views (id, object_id, name, view_type, config, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    rusqlite::params![
                        r.id,
                        r.object_id,
                        r.name,
                        r.view_type,
                        json_param(r.config.as_ref())?,
                        r.created_at,
                        r.updated_at,
                    ],
                )?;
            }
            RowSnapshot::Object(r) => {
                self.conn().execute(
                    "INSERT INTO objects (id, application_id, name, label, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        r.id,
                        r.application_id,
                        r.name,
                        r.label,
                        r.created_at,
                        r.updated_at,
                    ],
                )?;
            }
            RowSnapshot::Application(r) => {
                self.conn().execute(
                    "INSERT INTO applications (id, name, description, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    rusqlite::params![r.id, r.name, r.description, r.created_at, r.updated_at],
                )?;
            }
            RowSnapshot::Theme(r) => {
                self.conn().execute(
                    "INSERT INTO themes (id, application_id, name, palette, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        r.id,
                        r.application_id,
                        r.name,
                        json_param(r.palette.as_ref())?,
                        r.created_at,
                        r.updated_at,
                    ],
                )?;
            }
            RowSnapshot::DecisionTable(r) => {
                self.conn().execute(
                    "INSERT INTO decision_tables (id, object_id, name, rules, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        r.id,
                        r.object_id,
                        r.name,
                        json_param(r.rules.as_ref())?,
                        r.created_at,
                        r.updated_at,
                    ],
                )?;
            }
        }
        Ok(())
    }

    fn update_row(&mut self, row: &RowSnapshot) -> Result<usize> {
        let affected = match row {
            RowSnapshot::Field(r) => self.conn().execute(
                "UPDATE fields SET object_id = ?1, name = ?2, field_type = ?3, required = ?4, options = ?5, updated_at = ?6
                 WHERE id = ?7",
                rusqlite::params![
                    r.object_id,
                    r.name,
                    r.field_type,
                    r.required,
                    json_param(r.options.as_ref())?,
                    r.updated_at,
                    r.id,
                ],
            )?,
            RowSnapshot::View(r) => self.conn().execute(
                "UPDATE views SET object_id = ?1, name = ?2, view_type = ?3, config = ?4, updated_at = ?5
                 WHERE id = ?6",
                rusqlite::params![
                    r.object_id,
                    r.name,
                    r.view_type,
                    json_param(r.config.as_ref())?,
                    r.updated_at,
                    r.id,
                ],
            )?,
            RowSnapshot::Object(r) => self.conn().execute(
                "UPDATE objects SET application_id = ?1, name = ?2, label = ?3, updated_at = ?4
                 WHERE id = ?5",
                rusqlite::params![r.application_id, r.name, r.label, r.updated_at, r.id],
            )?,
            RowSnapshot::Application(r) => self.conn().execute(
                "UPDATE applications SET name = ?1, description = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![r.name, r.description, r.updated_at, r.id],
            )?,
            RowSnapshot::Theme(r) => self.conn().execute(
                "UPDATE themes SET application_id = ?1, name = ?2, palette = ?3, updated_at = ?4
                 WHERE id = ?5",
                rusqlite::params![
                    r.application_id,
                    r.name,
                    json_param(r.palette.as_ref())?,
                    r.updated_at,
                    r.id,
                ],
            )?,
            RowSnapshot::DecisionTable(r) => self.conn().execute(
                "UPDATE decision_tables SET object_id = ?1, name = ?2, rules = ?3, updated_at = ?4
                 WHERE id = ?5",
                rusqlite::params![
                    r.object_id,
                    r.name,
                    json_param(r.rules.as_ref())?,
                    r.updated_at,
                    r.id,
                ],
            )?,
        };
        Ok(affected)
    }

    fn delete_row(&mut self, table: EntityTable, id: i64) -> Result<usize> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", table.as_str());
        Ok(self.conn().execute(&sql, [id])?)
    }

    fn get_rows(&self, table: EntityTable, ids: &[i64]) -> Result<Vec<RowSnapshot>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (1..=ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {} FROM {} WHERE id IN ({placeholders})",
            select_cols(table),
            table.as_str()
        );

        let mut stmt = self.conn().prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();

        let rows = stmt.query_map(params.as_slice(), |row| snapshot_from_row(table, row))?;

        let mut out = Vec::new();
        for row in rows {
            match row {
                Ok(snapshot) => out.push(snapshot),
                Err(e) => {
                    warn!(table = table.as_str(), error = %e, "Skipping unreadable row in batch fetch");
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::SqliteStorage;

    fn now() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn make_object(storage: &mut SqliteStorage, name: &str) -> i64 {
        let ts = now();
        storage
            .insert_row(&RowSnapshot::Object(ObjectDef {
                id: 0,
                application_id: None,
                name: name.to_string(),
                label: None,
                created_at: ts,
                updated_at: ts,
            }))
            .unwrap()
    }

    fn make_field(object_id: i64, name: &str) -> RowSnapshot {
        let ts = now();
        RowSnapshot::Field(Field {
            id: 0,
            object_id,
            name: name.to_string(),
            field_type: "text".to_string(),
            required: false,
            options: None,
            created_at: ts,
            updated_at: ts,
        })
    }

    #[test]
    fn test_insert_get_round_trip() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = make_object(&mut storage, "Orders");

        let id = storage.insert_row(&make_field(object_id, "email")).unwrap();
        assert!(id > 0);

        let row = storage.get_row(EntityTable::Fields, id).unwrap().unwrap();
        assert_eq!(row.name(), "email");
        assert_eq!(row.id(), id);
        assert_eq!(row.owner_object_id(), Some(object_id));
    }

    #[test]
    fn test_find_id_by_name_scoped_to_owner() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let orders = make_object(&mut storage, "Orders");
        let invoices = make_object(&mut storage, "Invoices");

        let id = storage.insert_row(&make_field(orders, "email")).unwrap();

        assert_eq!(
            storage
                .find_id_by_name(EntityTable::Fields, Some(orders), "email")
                .unwrap(),
            Some(id)
        );
        // Same name under a different object is a different row
        assert_eq!(
            storage
                .find_id_by_name(EntityTable::Fields, Some(invoices), "email")
                .unwrap(),
            None
        );
        // Probe without an owner is a caller bug
        assert!(storage
            .find_id_by_name(EntityTable::Fields, None, "email")
            .is_err());
    }

    #[test]
    fn test_update_writes_full_row_but_not_created_at() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = make_object(&mut storage, "Orders");
        let id = storage.insert_row(&make_field(object_id, "email")).unwrap();

        let original = storage.get_row(EntityTable::Fields, id).unwrap().unwrap();
        let RowSnapshot::Field(mut field) = original.clone() else {
            panic!("expected field");
        };
        field.name = "contact_email".to_string();
        field.required = true;
        field.updated_at += 1000;
        field.created_at = 999_999; // must be ignored by update

        let affected = storage.update_row(&RowSnapshot::Field(field)).unwrap();
        assert_eq!(affected, 1);

        let updated = storage.get_row(EntityTable::Fields, id).unwrap().unwrap();
        let RowSnapshot::Field(updated) = updated else {
            panic!("expected field");
        };
        assert_eq!(updated.name, "contact_email");
        assert!(updated.required);
        let RowSnapshot::Field(orig) = original else {
            panic!("expected field");
        };
        assert_eq!(updated.created_at, orig.created_at);
    }

    #[test]
    fn test_update_missing_row_affects_zero() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = make_object(&mut storage, "Orders");

        let RowSnapshot::Field(mut field) = make_field(object_id, "ghost") else {
            panic!("expected field");
        };
        field.id = 9999;
        let affected = storage.update_row(&RowSnapshot::Field(field)).unwrap();
        assert_eq!(affected, 0);
    }

    #[test]
    fn test_insert_with_id_preserves_id() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = make_object(&mut storage, "Orders");

        let RowSnapshot::Field(mut field) = make_field(object_id, "restored") else {
            panic!("expected field");
        };
        field.id = 101;
        storage.insert_row_with_id(&RowSnapshot::Field(field)).unwrap();

        let row = storage.get_row(EntityTable::Fields, 101).unwrap();
        assert!(row.is_some());
    }

    #[test]
    fn test_delete_is_idempotent_at_store_level() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = make_object(&mut storage, "Orders");
        let id = storage.insert_row(&make_field(object_id, "email")).unwrap();

        assert_eq!(storage.delete_row(EntityTable::Fields, id).unwrap(), 1);
        assert_eq!(storage.delete_row(EntityTable::Fields, id).unwrap(), 0);
    }

    #[test]
    fn test_get_rows_batch_skips_corrupt_rows() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let object_id = make_object(&mut storage, "Orders");
        let good = storage.insert_row(&make_field(object_id, "good")).unwrap();
        let bad = storage.insert_row(&make_field(object_id, "bad")).unwrap();

        // Corrupt the options column behind the store's back
        storage
            .conn()
            .execute(
                "UPDATE fields SET options = 'not json' WHERE id = ?1",
                [bad],
            )
            .unwrap();

        let rows = storage
            .get_rows(EntityTable::Fields, &[good, bad])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name(), "good");
    }

    #[test]
    fn test_objects_probe_handles_null_application() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let id = make_object(&mut storage, "Standalone");

        assert_eq!(
            storage
                .find_id_by_name(EntityTable::Objects, None, "Standalone")
                .unwrap(),
            Some(id)
        );
        assert_eq!(
            storage
                .find_id_by_name(EntityTable::Objects, Some(42), "Standalone")
                .unwrap(),
            None
        );
    }
}
