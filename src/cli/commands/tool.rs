//! Tool command implementation: dispatch into the capture catalog.

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::session::capture::{CaptureStatus, MutationCapture, TOOLS};
use crate::storage::SqliteStorage;
use std::path::PathBuf;

/// Execute a mutation tool by name, or list the catalog.
///
/// # Errors
///
/// Returns an error for an unknown tool, a bad payload, or a failed
/// mutation.
pub fn execute(name: &str, data: Option<&str>, db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    if name == "list" {
        if json {
            println!("{}", serde_json::json!({ "tools": TOOLS }));
        } else {
            println!("Available tools:");
            for tool in TOOLS {
                println!("  {tool}");
            }
        }
        return Ok(());
    }

    let db_path = resolve_db_path(db_path.map(|p| p.as_path())).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    let payload = data.ok_or_else(|| {
        Error::InvalidArgument(format!("tool '{name}' requires a --data JSON payload"))
    })?;

    let mut storage = SqliteStorage::open(&db_path)?;
    let outcome = MutationCapture::new(&mut storage).run(name, payload)?;

    if crate::is_silent() {
        for row in &outcome.rows {
            println!("{}", row.id());
        }
        return Ok(());
    }

    if json {
        println!("{}", serde_json::to_string(&outcome)?);
    } else {
        println!("Ran {}", outcome.tool);
        for row in &outcome.rows {
            println!("  {} #{} ({})", row.table().rule_type(), row.id(), row.name());
        }
        match outcome.capture {
            CaptureStatus::Recorded => println!("  Captured for undo"),
            CaptureStatus::NoSession => {
                println!("  No session open - this change is not captured");
            }
            CaptureStatus::Degraded => {
                println!("  Warning: capture failed - this change cannot be reversed");
            }
        }
    }

    Ok(())
}
