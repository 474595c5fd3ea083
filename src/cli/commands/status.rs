//! Status command implementation.

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::history::HistoryProjector;
use crate::storage::SqliteStorage;
use colored::Colorize;
use std::path::PathBuf;

/// Execute the status command.
///
/// # Errors
///
/// Returns an error if the database is missing or a query fails.
pub fn execute(
    scope_id: Option<i64>,
    application_id: Option<i64>,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(|p| p.as_path())).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    let storage = SqliteStorage::open(&db_path)?;
    let report = HistoryProjector::new(&storage).status(scope_id, application_id)?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    match &report.active_session {
        Some(session) => {
            println!("{} {}", "Active session:".green().bold(), session.id);
            println!("  Scope: {}", session.scope_id);
            if let Some(ref desc) = session.description {
                println!("  {desc}");
            }
            if !session.tools_executed.is_empty() {
                println!("  Tools so far: {}", session.tools_executed.join(", "));
            }
            if session.has_gaps {
                println!("  {}", "Reversibility degraded (capture gaps)".yellow());
            }
        }
        None => println!("{}", "No active session.".dimmed()),
    }

    println!();
    println!("Checkpoints: {}", report.summary.total);
    for (source, count) in &report.summary.by_source {
        println!("  {source}: {count}");
    }

    Ok(())
}
