//! cannonade: fire noisy JPEG payloads at an HTTP endpoint in staged waves
//! and report latency percentiles per stage.

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

use commands::Command;

/// Staged HTTP load generator
#[derive(Parser)]
#[command(name = "cannonade")]
#[command(about = "Shoot payloads at an HTTP endpoint and report latency percentiles", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.command.is_verbose());
    cli.command.execute()
}

/// Log to stderr so stdout carries only the report. `RUST_LOG` wins over the
/// default level.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "info" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
