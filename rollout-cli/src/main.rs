//! Rollout: deterministic, resumable contract deployments.
//!
//! # Usage
//!
//! ```text
//! rollout plan [--tags <unit-or-tag>,...]
//! rollout deploy [--env <name>,...] [--tags <unit-or-tag>,...] [--dry-run]
//! rollout status [--env <name>] [--tags ...] [--json]
//! rollout accounts [--env <name>]
//! rollout export [--env <name>] [--output <file>]
//! ```
//!
//! Every command except `plan` reads `rollout.yaml` (override with `--config`).

mod commands;
mod units;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    accounts::AccountsArgs, deploy::DeployArgs, export::ExportArgs, plan::PlanArgs,
    status::StatusArgs,
};
use rollout_core::config::CONFIG_FILE;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "rollout",
    version,
    about = "Deploy contract systems in dependency order, resumably",
    long_about = None,
)]
struct Cli {
    /// Path to the configuration file.
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Log progress to stderr (`RUST_LOG` takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the execution order of the selected units.
    Plan(PlanArgs),

    /// Run the selected units against one or more environments.
    Deploy(DeployArgs),

    /// Compare each unit with the environment's registry.
    Status(StatusArgs),

    /// Resolve named account roles for an environment.
    Accounts(AccountsArgs),

    /// Print the environment's registry as name → address + interface.
    Export(ExportArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Commands::Plan(args) => args.run(),
        Commands::Deploy(args) => args.run(&cli.config),
        Commands::Status(args) => args.run(&cli.config),
        Commands::Accounts(args) => args.run(&cli.config),
        Commands::Export(args) => args.run(&cli.config),
    }
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
