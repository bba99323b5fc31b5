//! `cannonade` CLI subcommands.
//!
//! Provides `run` (execute a schedule against an endpoint) and `init`
//! (generate a starter config).

mod init;
mod run;

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

/// Top-level commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fire payloads at an endpoint
    ///
    /// Executes the schedule defined in cannonade.toml (or a custom config
    /// path, or the flags below) and prints one report per stage.
    Run(RunArgs),

    /// Generate a starter cannonade.toml in the current directory
    Init {
        /// Overwrite existing config file
        #[arg(long)]
        force: bool,
    },
}

/// Flags for `cannonade run`. Every flag overrides the config file.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Endpoint to shoot at
    pub endpoint: String,

    /// Path to config file (default: auto-discover cannonade.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// JPEG image to shoot with
    #[arg(long)]
    pub image: Option<PathBuf>,

    /// Number of parallel requests (ignored when stages are defined)
    #[arg(long)]
    pub num_clients: Option<u32>,

    /// Total number of requests (ignored when stages are defined)
    #[arg(long)]
    pub num_requests: Option<u32>,

    /// Per-request timeout in seconds
    #[arg(long)]
    pub timeout: Option<f64>,

    /// API key appended to the endpoint as a query parameter
    #[arg(long, env = "CANNONADE_APIKEY", hide_env_values = true)]
    pub apikey: Option<String>,

    /// Stages as requests:concurrency pairs, e.g. "10:2,50:10"
    #[arg(long)]
    pub schedule: Option<String>,

    /// Append every request latency (ms) to this file
    #[arg(long)]
    pub latency_log: Option<PathBuf>,

    /// Print each response body instead of a progress bar
    #[arg(long, conflicts_with = "silent")]
    pub verbose: bool,

    /// Disable all output except errors
    #[arg(long)]
    pub silent: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

impl Command {
    /// Whether the user asked for verbose output.
    pub fn is_verbose(&self) -> bool {
        matches!(self, Command::Run(args) if args.verbose)
    }

    /// Execute the selected subcommand.
    pub fn execute(self) -> Result<()> {
        match self {
            Command::Run(args) => {
                let runtime = tokio::runtime::Runtime::new()?;
                runtime.block_on(run::execute_run(args))
            },
            Command::Init { force } => init::execute_init(force),
        }
    }
}
