//! callguard: command-line front end for the rewriter and the policy engine
//!
//! ## Features
//!
//! - **check-config**: validate a policy and print the effective allow-lists
//! - **transform**: guard class artifacts on disk, one file or a whole tree
//! - **inspect**: print a class artifact as JSON or as an instruction listing
//! - **assemble**: turn a JSON class description into a binary artifact
//! - **simulate**: run a guarded operation as a given module under a policy
//!
//! ## Example Usage
//!
//! ```bash
//! # Validate a policy file
//! callguard check-config --config policy.properties
//!
//! # Guard every artifact under ./classes, writing to ./guarded
//! callguard transform ./classes --output ./guarded
//!
//! # Would app.tools be allowed to spawn `ls`?
//! callguard simulate --principal app.tools \
//!     --set callguard.system.exec.allow="module app.tools" exec -- ls
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod callguard_cli;

use callguard_cli::{
    assemble::AssembleCmd, check_config::CheckConfigCmd, inspect::InspectCmd,
    simulate::SimulateCmd, transform::TransformCmd,
};

#[derive(Parser)]
#[command(
    name = "callguard",
    author,
    version,
    about = "Caller-aware guards for exit, exec and connect call sites",
    long_about = "Rewrites compiled class artifacts so that process exit, process spawn and \
                  socket connect calls go through a guard, and evaluates the policy that guard \
                  enforces."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable format
    #[arg(long, global = true)]
    json: bool,

    /// Log filter, e.g. "debug" or "callguard_core=trace" (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a policy configuration and print the allow-lists
    CheckConfig(CheckConfigCmd),

    /// Inject guards into class artifacts
    Transform(TransformCmd),

    /// Print a class artifact
    Inspect(InspectCmd),

    /// Build a binary class artifact from its JSON description
    Assemble(AssembleCmd),

    /// Run a guarded operation as a given module
    Simulate(SimulateCmd),
}

fn main() -> Result<()> {
    let Cli {
        command,
        json,
        log_level,
    } = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    match command {
        Commands::CheckConfig(cmd) => cmd.execute(json),
        Commands::Transform(cmd) => cmd.execute(json),
        Commands::Inspect(cmd) => cmd.execute(json),
        Commands::Assemble(cmd) => cmd.execute(json),
        Commands::Simulate(cmd) => cmd.execute(json),
    }
}
