//! `cannonade run` command implementation.

use anyhow::{Context, Result};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use cannonade::loadtest::client::TargetClient;
use cannonade::loadtest::config::{LoadTestConfig, Stage};
use cannonade::loadtest::engine::{LoadTestEngine, OutputMode};
use cannonade::loadtest::payload::{source_from_settings, PayloadSource};
use cannonade::loadtest::sink::FileLatencySink;
use cannonade::loadtest::summary::{render_header, render_report, render_totals};

use super::RunArgs;

/// Name of the config file looked up by auto-discovery.
const CONFIG_FILE_NAME: &str = "cannonade.toml";

/// Execute the `run` command.
///
/// Loads config (explicit path, auto-discovery, or built-in defaults), applies
/// CLI overrides, builds the payload source, target client and optional
/// latency log, then runs the schedule and prints a report per stage.
pub async fn execute_run(args: RunArgs) -> Result<()> {
    // Step 1: Load config
    let mut config = match &args.config {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: {}\nUse `cannonade init` to create one.",
                    path.display()
                );
            }
            load_config(path)?
        },
        None => match discover_config() {
            Some(path) => load_config(&path)?,
            None => LoadTestConfig::default(),
        },
    };

    // Step 2: Apply CLI overrides
    apply_overrides(&mut config, &args)?;
    config.validate()?;

    let output = output_mode(&args);
    if args.no_color || !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    // Step 3: Build collaborators. Every failure here is fatal before any
    // request is fired.
    let source: Arc<dyn PayloadSource> = source_from_settings(&config.payload)
        .context("Failed to prepare payload")?
        .into();
    let target = TargetClient::new(
        &args.endpoint,
        config.settings.apikey.as_deref(),
        config.settings.timeout_as_duration()?,
    )?;
    tracing::info!(timeout = ?target.timeout(), "target client ready");
    let mut engine = LoadTestEngine::new(config, Arc::new(target)).with_output(output);
    if let Some(path) = &args.latency_log {
        let sink = FileLatencySink::open(path)?;
        engine = engine.with_sink(Arc::new(sink));
    }

    // Step 4: Run the schedule, printing each report as its stage completes
    let quiet = engine.output() == OutputMode::Silent;
    if !quiet {
        println!("{}", render_header(&args.endpoint, engine.config()));
    }
    let result = engine
        .run(source, |report| {
            if !quiet {
                println!();
                println!("{}", render_report(report));
            }
        })
        .await
        .context("Load test failed")?;

    if !quiet && result.reports.len() > 1 {
        println!();
        println!("{}", render_totals(&result));
    }

    Ok(())
}

fn load_config(path: &std::path::Path) -> Result<LoadTestConfig> {
    tracing::info!(path = %path.display(), "loading config");
    LoadTestConfig::load(path)
        .with_context(|| format!("Failed to load config '{}'", path.display()))
}

fn output_mode(args: &RunArgs) -> OutputMode {
    if args.silent {
        OutputMode::Silent
    } else if args.verbose {
        OutputMode::Verbose
    } else {
        OutputMode::Progress
    }
}

/// Apply CLI flag overrides to a loaded config.
///
/// `--schedule` replaces any `[[stage]]` blocks. When stages are in effect,
/// `--num-clients` and `--num-requests` are ignored with a warning.
fn apply_overrides(config: &mut LoadTestConfig, args: &RunArgs) -> Result<()> {
    if let Some(schedule) = &args.schedule {
        config.stage = Stage::parse_schedule(schedule)?;
    }
    if config.has_stages() && (args.num_clients.is_some() || args.num_requests.is_some()) {
        tracing::warn!(
            "--num-clients/--num-requests ignored because a stage schedule is defined"
        );
    }
    if let Some(n) = args.num_clients {
        config.settings.num_clients = n;
    }
    if let Some(n) = args.num_requests {
        config.settings.num_requests = n;
    }
    if let Some(t) = args.timeout {
        config.settings.timeout_secs = t;
    }
    if let Some(key) = &args.apikey {
        config.settings.apikey = Some(key.clone());
    }
    if let Some(image) = &args.image {
        config.payload.image = Some(image.clone());
        config.payload.body = None;
    }
    Ok(())
}

/// Discover `cannonade.toml` by walking parent directories.
///
/// Starts from the current working directory and walks up until either
/// the file is found or the filesystem root is reached.
fn discover_config() -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        let candidate = dir.join(CONFIG_FILE_NAME);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}
