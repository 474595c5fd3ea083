//! Data models for RuleVault.
//!
//! - [`checkpoint`] - Checkpoint records and their lifecycle
//! - [`undo`] - Undo-log entries (reversible mutation records)
//! - [`entity`] - Builder entity rows and the snapshot tagged union
//! - [`change`] - Derived, read-only change projections

pub mod change;
pub mod checkpoint;
pub mod entity;
pub mod undo;

pub use change::{
    CategoryChanges, CheckoutGroup, CheckoutSummary, CheckpointWithChanges, RuleChange,
    StatusReport, StatusSummary,
};
pub use checkpoint::{Checkpoint, CheckpointSource, CheckpointStatus};
pub use entity::{
    Application, DecisionTable, EntityTable, Field, ObjectDef, RowSnapshot, RuleCategory, Theme,
    View,
};
pub use undo::{PrimaryKey, UndoLogEntry, UndoOperation};
