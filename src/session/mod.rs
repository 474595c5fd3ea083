//! Checkpoint sessions: the session manager and mutation capture.
//!
//! - [`manager`] - begin/commit/rollback and checkpoint bookkeeping
//! - [`capture`] - the wrapped tool catalog that snapshots every mutation

pub mod capture;
pub mod manager;

pub use capture::{CaptureStatus, MutationCapture, ToolOutcome, WriteIntent};
pub use manager::{BeginRequest, RollbackOutcome, SessionManager};
