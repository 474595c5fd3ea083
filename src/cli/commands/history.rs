//! History command implementation.

use crate::config::resolve_db_path;
use crate::error::{Error, Result};
use crate::history::HistoryProjector;
use crate::storage::SqliteStorage;
use colored::Colorize;
use std::path::PathBuf;

/// Execute the history command.
///
/// With `--checkout`, shows the de-duplicated aggregation grouped by
/// owning object instead of the per-checkpoint change lists.
///
/// # Errors
///
/// Returns an error if the database is missing or a query fails.
pub fn execute(
    scope_id: Option<i64>,
    application_id: Option<i64>,
    checkout: bool,
    db_path: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let db_path = resolve_db_path(db_path.map(|p| p.as_path())).ok_or(Error::NotInitialized)?;

    if !db_path.exists() {
        return Err(Error::NotInitialized);
    }

    let storage = SqliteStorage::open(&db_path)?;
    let projector = HistoryProjector::new(&storage);

    if checkout {
        let summary = projector.checkout_summary(scope_id, application_id)?;

        if json {
            println!("{}", serde_json::to_string(&summary)?);
            return Ok(());
        }

        if summary.groups.is_empty() {
            println!("No changes found.");
            return Ok(());
        }

        println!("Changes ({} rules):", summary.total);
        println!();
        for group in &summary.groups {
            println!("{}", group.owner_name.bold());
            for category in &group.categories {
                println!("  [{}]", category.category);
                for rule in &category.rules {
                    println!("    {} {} ({})", rule.operation, rule.name, rule.rule_type);
                }
            }
            println!();
        }
        return Ok(());
    }

    let history = projector.history_with_changes(scope_id, application_id)?;

    if json {
        println!("{}", serde_json::to_string(&history)?);
        return Ok(());
    }

    if history.is_empty() {
        println!("No checkpoints found.");
        return Ok(());
    }

    println!("Checkpoints ({} found):", history.len());
    println!();
    for entry in &history {
        let cp = &entry.checkpoint;
        println!("• {} [{}]", cp.id.bold(), cp.status.as_str());
        if let Some(ref desc) = cp.description {
            println!("  {desc}");
        }
        println!("  Scope: {}  Source: {}", cp.scope_id, cp.source.as_str());
        if cp.has_gaps {
            println!("  {}", "Reversibility degraded (capture gaps)".yellow());
        }
        for rule in &entry.updated_rules {
            println!("    {} {} ({})", rule.operation, rule.name, rule.rule_type);
        }
        println!();
    }

    Ok(())
}
