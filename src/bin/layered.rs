//! Layered CLI Binary
//!
//! Command-line interface for merging layer directories into one output tree.

use anyhow::Context;
use clap::Parser;
use layered_files::cli::{map_error, Cli, CliError, RunContext};
use layered_files::config::ConfigLoader;
use layered_files::logging::{init_logging, LoggingConfig};
use layered_files::paths::LayerPaths;
use std::process;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Build logging config from CLI args, env vars, and config file
    let logging_config = build_logging_config(&cli);

    // Initialize logging early
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("Layered CLI starting");

    if let Err(e) = run(&cli).await {
        error!("Command failed: {:#}", e);
        match e.downcast_ref::<CliError>() {
            Some(cli_error) => eprintln!("{}", map_error(cli_error)),
            None => eprintln!("error: {:#}", e),
        }
        process::exit(1);
    }
}

async fn run(cli: &Cli) -> anyhow::Result<()> {
    let context = RunContext::new(&cli.root, cli.config.clone())?;
    info!(root = ?context.paths().project_root, "Project loaded");

    let output = context.execute(&cli.command).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    info!("Command completed successfully");
    Ok(())
}

/// Build logging configuration from CLI args and config file.
/// Precedence: CLI flags override config file override defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = load_logging_section(cli).unwrap_or_default();

    if cli.quiet {
        config.enabled = false;
    }
    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    if let Some(ref output) = cli.log_output {
        config.output = output.clone();
    }
    if let Some(ref file) = cli.log_file {
        config.file = Some(file.clone());
    }

    config
}

/// Logging section of the project configuration; errors surface later from `run`
fn load_logging_section(cli: &Cli) -> anyhow::Result<LoggingConfig> {
    let config = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => {
            let paths = LayerPaths::resolve(&cli.root)?;
            ConfigLoader::load(&paths.project_root)?
        }
    };
    Ok(config.logging)
}
