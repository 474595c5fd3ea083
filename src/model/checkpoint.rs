//! Checkpoint model for RuleVault.
//!
//! A checkpoint is a named, time-bounded grouping of entity mutations with
//! its own lifecycle. Exactly one checkpoint may be `active` at a time; the
//! active row in the database *is* the open session.

use serde::{Deserialize, Serialize};

/// Where a checkpoint session originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointSource {
    Llm,
    Mcp,
    Api,
}

impl CheckpointSource {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Mcp => "mcp",
            Self::Api => "api",
        }
    }

    /// Parse from string.
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "llm" => Self::Llm,
            "mcp" => Self::Mcp,
            _ => Self::Api,
        }
    }
}

impl Default for CheckpointSource {
    fn default() -> Self {
        Self::Api
    }
}

/// Checkpoint lifecycle status.
///
/// Lifecycle: created as `active` by begin; `committed` on commit;
/// `rolled_back` on rollback or restore. `historical` is a terminal alias
/// written by older builds and accepted on read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    Active,
    Historical,
    Committed,
    RolledBack,
}

impl CheckpointStatus {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Historical => "historical",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }

    /// Parse from string. Unknown values map to `historical` (terminal)
    /// rather than `active`, so a corrupt row can never masquerade as an
    /// open session.
    #[must_use]
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "active" => Self::Active,
            "committed" => Self::Committed,
            "rolled_back" => Self::RolledBack,
            _ => Self::Historical,
        }
    }

    /// Whether this status ends the checkpoint's lifecycle.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// A checkpoint in RuleVault.
///
/// Groups a batch of entity mutations so they can be committed, rolled
/// back, or restored-to as one unit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Unique identifier (`ckpt_` + 12 hex chars)
    pub id: String,

    /// Owning object/workflow the checkpoint applies to
    pub scope_id: i64,

    /// Broader application scope, if the checkpoint spans objects
    pub application_id: Option<i64>,

    /// Free-text description of the batch
    pub description: Option<String>,

    /// The user command or prompt that triggered the batch
    pub user_command: Option<String>,

    /// Where the session originated
    pub source: CheckpointSource,

    /// Lifecycle status
    pub status: CheckpointStatus,

    /// Ordered tool names invoked during the session (append-only while active)
    pub tools_executed: Vec<String>,

    /// Set when a capture step failed and reversibility is degraded
    pub has_gaps: bool,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Commit/rollback timestamp (Unix milliseconds)
    pub finished_at: Option<i64>,
}

impl Checkpoint {
    /// Create a new active checkpoint for a scope.
    #[must_use]
    pub fn new(scope_id: i64, source: CheckpointSource) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let id = format!("ckpt_{}", &uuid::Uuid::new_v4().simple().to_string()[..12]);

        Self {
            id,
            scope_id,
            application_id: None,
            description: None,
            user_command: None,
            source,
            status: CheckpointStatus::Active,
            tools_executed: Vec::new(),
            has_gaps: false,
            created_at: now,
            finished_at: None,
        }
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// Set the triggering user command.
    #[must_use]
    pub fn with_user_command(mut self, command: &str) -> Self {
        self.user_command = Some(command.to_string());
        self
    }

    /// Scope the checkpoint to an application.
    #[must_use]
    pub fn with_application(mut self, application_id: i64) -> Self {
        self.application_id = Some(application_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_checkpoint() {
        let cp = Checkpoint::new(42, CheckpointSource::Llm)
            .with_description("Add Email field")
            .with_application(7);

        assert!(cp.id.starts_with("ckpt_"));
        assert_eq!(cp.id.len(), "ckpt_".len() + 12);
        assert_eq!(cp.scope_id, 42);
        assert_eq!(cp.application_id, Some(7));
        assert_eq!(cp.status, CheckpointStatus::Active);
        assert!(cp.tools_executed.is_empty());
        assert!(!cp.has_gaps);
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(CheckpointStatus::from_str("active"), CheckpointStatus::Active);
        assert_eq!(CheckpointStatus::from_str("committed"), CheckpointStatus::Committed);
        assert_eq!(
            CheckpointStatus::from_str("rolled_back"),
            CheckpointStatus::RolledBack
        );
        // Legacy alias and unknown values both land on a terminal status
        assert_eq!(
            CheckpointStatus::from_str("historical"),
            CheckpointStatus::Historical
        );
        assert_eq!(
            CheckpointStatus::from_str("garbage"),
            CheckpointStatus::Historical
        );
    }

    #[test]
    fn test_only_active_is_open() {
        assert!(!CheckpointStatus::Active.is_terminal());
        assert!(CheckpointStatus::Historical.is_terminal());
        assert!(CheckpointStatus::Committed.is_terminal());
        assert!(CheckpointStatus::RolledBack.is_terminal());
    }

    #[test]
    fn test_source_parsing() {
        assert_eq!(CheckpointSource::from_str("llm"), CheckpointSource::Llm);
        assert_eq!(CheckpointSource::from_str("MCP"), CheckpointSource::Mcp);
        assert_eq!(CheckpointSource::from_str("unknown"), CheckpointSource::Api);
    }
}
