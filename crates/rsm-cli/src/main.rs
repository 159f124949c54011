//! # rsm CLI Entry Point
//!
//! Parses arguments and dispatches to the subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use rsm_cli::database::{run_audit_verify, run_migrate, AuditVerifyArgs, DatabaseArgs};
use rsm_cli::quote::{run_quote, QuoteArgs};
use rsm_cli::transitions::{run_transitions, TransitionsArgs};

/// Revenue stamp management operator CLI.
#[derive(Parser, Debug)]
#[command(name = "rsm", version, about)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print a lifecycle's statuses and legal transitions.
    Transitions(TransitionsArgs),
    /// Price an order.
    Quote(QuoteArgs),
    /// Apply database migrations.
    Migrate(DatabaseArgs),
    /// Verify the audit log hash chain.
    AuditVerify(AuditVerifyArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let result = match &cli.command {
        Commands::Transitions(args) => run_transitions(args),
        Commands::Quote(args) => run_quote(args),
        Commands::Migrate(args) => run_migrate(args),
        Commands::AuditVerify(args) => run_audit_verify(args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("error: {e:#}");
            ExitCode::from(1)
        }
    }
}
