//! RuleVault CLI entry point.

use clap::Parser;
use rv::cli::commands;
use rv::cli::{Cli, Commands};
use rv::error::Error;
use std::process::ExitCode;

/// Rewrite named flags to positional args for agent ergonomics.
///
/// Agents (Claude Code, Codex, etc.) naturally generate `--id "ckpt_x"`
/// instead of positional `"ckpt_x"`. This preprocessor transparently
/// converts known flag patterns so both forms work.
fn preprocess_args(args: impl Iterator<Item = String>) -> Vec<String> {
    // Map of --flag names to their positional subcommand contexts.
    //
    // Only applies to flags that shadow positional args; named
    // flags like --description already work via clap.
    const POSITIONAL_ALIASES: &[&str] = &[
        "--id",   // restore, delete
        "--tool", // tool
    ];

    let mut result = Vec::new();
    let mut iter = args.peekable();

    while let Some(arg) = iter.next() {
        if POSITIONAL_ALIASES.contains(&arg.as_str()) {
            // Strip the flag, keep the value
            if let Some(value) = iter.next() {
                result.push(value);
            }
        } else if let Some(flag) = POSITIONAL_ALIASES
            .iter()
            .find(|f| arg.starts_with(&format!("{}=", f)))
        {
            // Handle --flag=value form
            let value = arg[flag.len() + 1..].to_string();
            result.push(value);
        } else {
            result.push(arg);
        }
    }

    result
}

fn main() -> ExitCode {
    let args = preprocess_args(std::env::args());
    let cli = Cli::parse_from(args);

    if cli.silent {
        rv::SILENT.store(true, std::sync::atomic::Ordering::Relaxed);
    }
    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    // Run the command and handle errors
    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    match &cli.command {
        Commands::Init { force } => commands::init::execute(cli.db.as_ref(), *force, json),
        Commands::Version => commands::version::execute(json),

        // Session lifecycle
        Commands::Begin {
            scope_id,
            description,
            user_command,
            source,
            application_id,
        } => commands::session::execute_begin(
            *scope_id,
            description.as_deref(),
            user_command.as_deref(),
            source.as_deref(),
            *application_id,
            cli.db.as_ref(),
            json,
        ),
        Commands::Commit => commands::session::execute_commit(cli.db.as_ref(), json),
        Commands::Rollback => commands::session::execute_rollback(cli.db.as_ref(), json),

        // Capture-wrapped mutations
        Commands::Tool { name, data } => {
            commands::tool::execute(name, data.as_deref(), cli.db.as_ref(), json)
        }

        // Restore and history management
        Commands::Restore { id } => commands::checkpoint::execute_restore(id, cli.db.as_ref(), json),
        Commands::Delete { id } => commands::checkpoint::execute_delete(id, cli.db.as_ref(), json),
        Commands::DeleteAll {
            scope_id,
            application_id,
        } => commands::checkpoint::execute_delete_all(
            *scope_id,
            *application_id,
            cli.db.as_ref(),
            json,
        ),

        // Reads
        Commands::Status {
            scope_id,
            application_id,
        } => commands::status::execute(*scope_id, *application_id, cli.db.as_ref(), json),
        Commands::History {
            scope_id,
            application_id,
            checkout,
        } => commands::history::execute(
            *scope_id,
            *application_id,
            *checkout,
            cli.db.as_ref(),
            json,
        ),

        // Shell completions
        Commands::Completions { shell } => commands::completions::execute(shell),
    }
}
