//! Error types for RuleVault CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, 5=restore, etc.)
//! - Retryability flags for agent self-correction
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for RuleVault operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
///
/// Each code maps to a SCREAMING_SNAKE string and a category-based
/// exit code. Agents match on the string; shell scripts on the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    NotInitialized,
    AlreadyInitialized,
    DatabaseError,

    // Not Found (exit 3)
    CheckpointNotFound,
    EntityNotFound,
    NoActiveSession,

    // Validation (exit 4)
    InvalidArgument,
    UnknownTool,
    RequiredField,

    // Restore (exit 5)
    RestorePartial,
    SnapshotMalformed,
    RowVanished,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::CheckpointNotFound => "CHECKPOINT_NOT_FOUND",
            Self::EntityNotFound => "ENTITY_NOT_FOUND",
            Self::NoActiveSession => "NO_ACTIVE_SESSION",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::UnknownTool => "UNKNOWN_TOOL",
            Self::RequiredField => "REQUIRED_FIELD",
            Self::RestorePartial => "RESTORE_PARTIAL",
            Self::SnapshotMalformed => "SNAPSHOT_MALFORMED",
            Self::RowVanished => "ROW_VANISHED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized | Self::DatabaseError => 2,
            Self::CheckpointNotFound | Self::EntityNotFound | Self::NoActiveSession => 3,
            Self::InvalidArgument | Self::UnknownTool | Self::RequiredField => 4,
            Self::RestorePartial | Self::SnapshotMalformed | Self::RowVanished => 5,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether an agent should retry with corrected input.
    ///
    /// True for validation errors (bad tool name, bad payload) and transient
    /// database contention. False for not-found, restore, or internal errors.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument | Self::UnknownTool | Self::RequiredField | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in RuleVault CLI operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `rv init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Checkpoint not found: {id}")]
    CheckpointNotFound { id: String },

    #[error("Checkpoint not found: {id} (did you mean: {}?)", similar.join(", "))]
    CheckpointNotFoundSimilar { id: String, similar: Vec<String> },

    #[error("No active session")]
    NoActiveSession,

    #[error("{table} row not found: {id}")]
    EntityNotFound { table: String, id: i64 },

    #[error("Unknown tool: {name}")]
    UnknownTool { name: String, similar: Vec<String> },

    /// Reverse replay aborted partway. Entries applied before the failure
    /// stay applied; the store reflects "applied so far".
    #[error("Restore incomplete: {applied} entries applied, {remaining} not applied ({reason})")]
    RestorePartial {
        applied: usize,
        remaining: usize,
        reason: String,
    },

    #[error("Snapshot for {table} is malformed: {reason}")]
    SnapshotMalformed { table: String, reason: String },

    /// An update inverse targeted a row that no longer exists. The row was
    /// removed outside the undo log's knowledge, so write-back cannot proceed.
    #[error("{table} row {id} vanished before it could be restored")]
    RowVanished { table: String, id: i64 },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::CheckpointNotFound { .. } | Self::CheckpointNotFoundSimilar { .. } => {
                ErrorCode::CheckpointNotFound
            }
            Self::EntityNotFound { .. } => ErrorCode::EntityNotFound,
            Self::NoActiveSession => ErrorCode::NoActiveSession,
            Self::UnknownTool { .. } => ErrorCode::UnknownTool,
            Self::RestorePartial { .. } => ErrorCode::RestorePartial,
            Self::SnapshotMalformed { .. } => ErrorCode::SnapshotMalformed,
            Self::RowVanished { .. } => ErrorCode::RowVanished,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint for agents and humans.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => Some("Run `rv init` to initialize the database".to_string()),

            Self::AlreadyInitialized { path } => Some(format!(
                "Database already exists at {}. Use `--force` to reinitialize.",
                path.display()
            )),

            Self::NoActiveSession => Some(
                "No checkpoint session is open.\n  \
                 Start one: rv begin <scope-id> --description \"what you are changing\""
                    .to_string(),
            ),

            Self::CheckpointNotFound { id } => Some(format!(
                "No checkpoint with ID '{id}'. Use `rv history` to see checkpoints."
            )),
            Self::CheckpointNotFoundSimilar { similar, .. } => {
                Some(format!("Did you mean: {}?", similar.join(", ")))
            }

            Self::EntityNotFound { table, .. } => Some(format!(
                "No such row in '{table}'. For updates, pass the existing id; omit it to create."
            )),

            Self::UnknownTool { similar, .. } => {
                if similar.is_empty() {
                    Some("Use `rv tool list` to see the tool catalog".to_string())
                } else {
                    Some(format!("Did you mean: {}?", similar.join(", ")))
                }
            }

            Self::RestorePartial { .. } => Some(
                "The store reflects entries applied so far. Inspect `rv history` \
                 and re-run the restore once the reported row is fixed."
                    .to_string(),
            ),

            Self::InvalidArgument(msg) => {
                if msg.contains("source") {
                    Some(
                        "Valid sources: llm, mcp, api. Synonyms: agent→llm, server→mcp, rest→api"
                            .to_string(),
                    )
                } else if msg.contains("table") {
                    Some(
                        "Valid tables: fields, views, objects, applications, themes, decision_tables"
                            .to_string(),
                    )
                } else {
                    None
                }
            }

            Self::SnapshotMalformed { .. }
            | Self::RowVanished { .. }
            | Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    ///
    /// Includes error code, message, retryability, exit code, and
    /// optional recovery hint. Agents parse this instead of stderr text.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
