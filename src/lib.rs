//! RuleVault CLI - Transactional checkpoints and undo for low-code rule builders
//!
//! This crate provides the core functionality for the `rv` CLI tool: a
//! checkpoint/undo-log engine that groups entity mutations into reversible,
//! named sessions.
//!
//! # Architecture
//!
//! - [`cli`] - Command-line interface using clap
//! - [`model`] - Data types (Checkpoint, UndoLogEntry, entity rows, RuleChange)
//! - [`storage`] - SQLite database layer (checkpoint store, undo log, entity store)
//! - [`session`] - Session manager and mutation capture
//! - [`restore`] - Point-in-time restore engine
//! - [`history`] - Read-side change projection
//! - [`config`] - Configuration management
//! - [`error`] - Error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod error;
pub mod history;
pub mod model;
pub mod restore;
pub mod session;
pub mod storage;
pub mod validate;

pub use error::{Error, Result};

/// Global silent mode flag for `--silent` output.
///
/// When set, create/mutate commands print only the ID
/// instead of full output. Avoids threading a `silent` bool
/// through every handler signature.
pub static SILENT: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(false);

/// Check if silent mode is active.
#[inline]
pub fn is_silent() -> bool {
    SILENT.load(std::sync::atomic::Ordering::Relaxed)
}
