//! CLI parse: clap types for `layered`. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Layered files - merge ordered layer directories into one output tree
#[derive(Parser)]
#[command(name = "layered")]
#[command(about = "Merge ordered layer directories into a single output tree")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root directory (plain path or file:// location)
    #[arg(long, default_value = ".")]
    pub root: String,

    /// Configuration file path (replaces layered.toml discovery)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Disable logging entirely
    #[arg(long, short, default_value = "false")]
    pub quiet: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (when output is "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Fetch remote layers and merge every layer into the output root
    Merge {
        /// Remove stale output before copying
        #[arg(long)]
        clean: bool,
        /// Print the merge report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the layer precedence order without fetching or copying
    Plan {
        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },
    /// Merge, then re-merge on every change under the layers root until Ctrl-C
    Watch,
}
