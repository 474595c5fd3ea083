//! CLI definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;

/// RuleVault CLI - Transactional checkpoints and undo for low-code rule builders
#[derive(Parser, Debug)]
#[command(name = "rv", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Database path (default: ~/.rulevault/data/rulevault.db)
    #[arg(long, global = true, env = "RV_DB")]
    pub db: Option<PathBuf>,

    /// Output as JSON (for agent integration)
    #[arg(long, alias = "robot", global = true)]
    pub json: bool,

    /// Output only the ID (for agent scripting)
    #[arg(long, global = true)]
    pub silent: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize the RuleVault database
    Init {
        /// Overwrite existing database
        #[arg(long)]
        force: bool,
    },

    /// Open a checkpoint session for a scope
    Begin {
        /// Owning object/workflow id the checkpoint applies to
        scope_id: i64,

        /// What this batch of changes is for
        #[arg(short, long)]
        description: Option<String>,

        /// The user command or prompt that triggered the batch
        #[arg(long)]
        user_command: Option<String>,

        /// Session origin: llm, mcp, or api
        #[arg(long)]
        source: Option<String>,

        /// Broader application scope, if the batch spans objects
        #[arg(long)]
        application_id: Option<i64>,
    },

    /// Commit the active session, making its changes permanent
    Commit,

    /// Roll back the active session, reverting its changes
    Rollback,

    /// Run a capture-wrapped mutation tool (`rv tool list` shows the catalog)
    Tool {
        /// Tool name (e.g. save_field, delete_view), or "list"
        name: String,

        /// JSON payload for the tool
        #[arg(long)]
        data: Option<String>,
    },

    /// Restore scope state to immediately before a checkpoint
    Restore {
        /// Checkpoint ID to restore to
        id: String,
    },

    /// Delete a checkpoint and its undo log (history only; data untouched)
    Delete {
        /// Checkpoint ID to delete
        id: String,
    },

    /// Delete all checkpoints for a scope
    DeleteAll {
        /// Limit to one owning object
        #[arg(long)]
        scope_id: Option<i64>,

        /// Limit to one application
        #[arg(long)]
        application_id: Option<i64>,
    },

    /// Show the active session and checkpoint summary
    Status {
        /// Limit to one owning object
        #[arg(long)]
        scope_id: Option<i64>,

        /// Limit to one application
        #[arg(long)]
        application_id: Option<i64>,
    },

    /// Show checkpoint history with resolved rule changes
    History {
        /// Limit to one owning object
        #[arg(long)]
        scope_id: Option<i64>,

        /// Limit to one application
        #[arg(long)]
        application_id: Option<i64>,

        /// De-duplicated checkout aggregation instead of per-checkpoint lists
        #[arg(long)]
        checkout: bool,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}
