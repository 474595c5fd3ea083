//! Derived, read-only change projections.
//!
//! None of these are persisted; the history projector recomputes them per
//! query from checkpoints, undo-log entries, and current entity state.

use crate::model::checkpoint::Checkpoint;
use serde::Serialize;
use std::collections::BTreeMap;

/// One human-readable rule change, resolved from an undo-log entry.
#[derive(Debug, Clone, Serialize)]
pub struct RuleChange {
    /// Affected row id
    pub id: i64,
    /// Display name (current row, or the before-image for deletes)
    pub name: String,
    /// Entity type (e.g. "Field")
    #[serde(rename = "type")]
    pub rule_type: String,
    /// Category the rule belongs to ("data", "ui", "workflow", "app", "theme")
    pub category: String,
    /// "Create", "Update", or "Delete"
    pub operation: String,
    pub checkpoint_id: String,
    pub checkpoint_description: Option<String>,
    pub checkpoint_created_at: i64,
    pub checkpoint_source: String,
}

/// A checkpoint augmented with its resolved rule changes.
#[derive(Debug, Clone, Serialize)]
pub struct CheckpointWithChanges {
    #[serde(flatten)]
    pub checkpoint: Checkpoint,
    pub updated_rules: Vec<RuleChange>,
}

/// Rule changes for one category within a checkout group.
#[derive(Debug, Clone, Serialize)]
pub struct CategoryChanges {
    pub category: String,
    /// Most recent first
    pub rules: Vec<RuleChange>,
}

/// Changes grouped under one owning object (or application, for
/// application-level rules).
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutGroup {
    pub owner_id: i64,
    pub owner_name: String,
    pub categories: Vec<CategoryChanges>,
}

/// The de-duplicated "checkout" aggregation across a set of checkpoints.
///
/// Each touched row appears exactly once, reflecting its most recent
/// checkpoint. Groups are sorted alphabetically by owner name.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutSummary {
    pub groups: Vec<CheckoutGroup>,
    pub total: usize,
}

/// Checkpoint counts for the status report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusSummary {
    pub total: usize,
    pub by_source: BTreeMap<String, usize>,
}

/// Session/checkpoint status for a scope.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub active_session: Option<Checkpoint>,
    pub active_checkpoints: Vec<Checkpoint>,
    pub summary: StatusSummary,
}
