//! Initialize the RuleVault database.
//!
//! RuleVault uses a single global database shared by every caller on the
//! machine (`~/.rulevault/data/rulevault.db`, or the test location when
//! `RV_TEST_DB=1`). One database is what makes the single-active-session
//! invariant enforceable across processes.

use crate::config::{global_rulevault_dir, is_test_mode, resolve_db_path};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
}

/// Execute the init command.
///
/// Creates the database file and applies the schema. An explicit `--db`
/// path wins over the global location.
///
/// # Errors
///
/// Returns an error if the directory or database cannot be created, or if
/// the database already exists and `--force` was not given.
pub fn execute(db_path: Option<&PathBuf>, force: bool, json: bool) -> Result<()> {
    let db_path = match resolve_db_path(db_path.map(|p| p.as_path())) {
        Some(path) => path,
        None => {
            let base = global_rulevault_dir().ok_or_else(|| {
                Error::Config("Could not determine global RuleVault directory".to_string())
            })?;
            let subdir = if is_test_mode() { "test" } else { "data" };
            base.join(subdir).join("rulevault.db")
        }
    };

    if db_path.exists() && !force {
        return Err(Error::AlreadyInitialized { path: db_path });
    }

    if let Some(parent) = db_path.parent() {
        fs::create_dir_all(parent)?;
    }

    if db_path.exists() && force {
        fs::remove_file(&db_path)?;
    }

    // Opening applies the schema
    let _storage = SqliteStorage::open(&db_path)?;

    if crate::is_silent() {
        println!("{}", db_path.display());
        return Ok(());
    }

    if json {
        let output = InitOutput { database: db_path };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Initialized RuleVault database");
        println!("  Database: {}", db_path.display());
        println!();
        println!("Next: open a session with `rv begin <scope-id>`.");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_database() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("rulevault.db");

        execute(Some(&db), false, true).unwrap();
        assert!(db.exists());
    }

    #[test]
    fn test_init_fails_if_already_initialized() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("rulevault.db");

        execute(Some(&db), false, true).unwrap();
        let result = execute(Some(&db), false, true);
        assert!(matches!(result, Err(Error::AlreadyInitialized { .. })));
    }

    #[test]
    fn test_init_force_overwrites() {
        let temp = TempDir::new().unwrap();
        let db = temp.path().join("rulevault.db");

        execute(Some(&db), false, true).unwrap();
        execute(Some(&db), true, true).unwrap();
    }
}
