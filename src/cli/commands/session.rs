//! Session command implementations: begin, commit, rollback.

use crate::config::{default_source, resolve_db_path};
use crate::error::{Error, Result};
use crate::model::checkpoint::CheckpointSource;
use crate::session::manager::{BeginRequest, SessionManager};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::path::PathBuf;

/// Output for begin.
#[derive(Serialize)]
struct BeginOutput {
    checkpoint_id: String,
    scope_id: i64,
    description: Option<String>,
    source: String,
    started_at: i64,
}

/// Execute the begin command.
///
/// # Errors
///
/// Returns an error if the database is missing or the session cannot start.
pub fn execute_begin(
    scope_id: i64,
    description: Option<&str>,
    user_command: Option<&str>,
    source: Option<&str>,
    application_id: Option<i64>,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(|p| p.as_path())).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    let source = match source {
        Some(raw) => crate::validate::normalize_source(raw).map_err(|(input, suggestion)| {
            let mut msg = format!("invalid source '{input}'");
            if let Some(s) = suggestion {
                msg.push_str(&format!(" (did you mean '{s}'?)"));
            }
            Error::InvalidArgument(msg)
        })?,
        None => default_source(),
    };

    let mut storage = SqliteStorage::open(&db_path)?;
    let checkpoint = SessionManager::new(&mut storage).begin(BeginRequest {
        scope_id,
        description: description.map(ToString::to_string),
        user_command: user_command.map(ToString::to_string),
        source: CheckpointSource::from_str(&source),
        application_id,
    })?;

    if crate::is_silent() {
        println!("{}", checkpoint.id);
        return Ok(());
    }

    if json {
        let output = BeginOutput {
            checkpoint_id: checkpoint.id.clone(),
            scope_id: checkpoint.scope_id,
            description: checkpoint.description.clone(),
            source: checkpoint.source.as_str().to_string(),
            started_at: checkpoint.created_at,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Started session: {}", checkpoint.id);
        println!("  Scope: {}", checkpoint.scope_id);
        if let Some(ref desc) = checkpoint.description {
            println!("  {desc}");
        }
    }

    Ok(())
}

/// Execute the commit command.
///
/// # Errors
///
/// Returns an error if the database is missing or the commit fails.
pub fn execute_commit(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(|p| p.as_path())).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    let mut storage = SqliteStorage::open(&db_path)?;
    let committed = SessionManager::new(&mut storage).commit()?;

    match committed {
        Some(checkpoint) => {
            if json {
                let output = serde_json::json!({
                    "checkpoint_id": checkpoint.id,
                    "committed": true,
                    "tools_executed": checkpoint.tools_executed,
                    "has_gaps": checkpoint.has_gaps,
                });
                println!("{output}");
            } else {
                println!("Committed session: {}", checkpoint.id);
                if !checkpoint.tools_executed.is_empty() {
                    println!("  Tools: {}", checkpoint.tools_executed.join(", "));
                }
                if checkpoint.has_gaps {
                    println!("  Warning: some changes were not captured and cannot be reversed");
                }
            }
        }
        None => {
            if json {
                println!("{}", serde_json::json!({"committed": false, "reason": "no active session"}));
            } else {
                println!("No active session to commit.");
            }
        }
    }

    Ok(())
}

/// Execute the rollback command.
///
/// # Errors
///
/// Returns an error if the database is missing or the rollback fails.
pub fn execute_rollback(db_path: Option<&PathBuf>, json: bool) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(|p| p.as_path())).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    let mut storage = SqliteStorage::open(&db_path)?;
    let outcome = SessionManager::new(&mut storage).rollback()?;

    match outcome {
        Some(rolled) => {
            if json {
                let output = serde_json::json!({
                    "checkpoint_id": rolled.checkpoint_id,
                    "rolled_back": true,
                    "entries_reverted": rolled.entries_reverted,
                });
                println!("{output}");
            } else {
                println!("Rolled back session: {}", rolled.checkpoint_id);
                println!("  Changes reverted: {}", rolled.entries_reverted);
            }
        }
        None => {
            if json {
                println!(
                    "{}",
                    serde_json::json!({"rolled_back": false, "reason": "no active session"})
                );
            } else {
                println!("No active session to roll back.");
            }
        }
    }

    Ok(())
}
