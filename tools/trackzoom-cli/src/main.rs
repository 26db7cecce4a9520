//! trackzoom CLI — run a tracking zoom pipeline.
//!
//! Usage:
//!   trackzoom run [--input FILE | --topology JSON]      Play until end-of-stream
//!   trackzoom describe [--input FILE | --topology JSON] Print the graph as a launch line
//!   trackzoom check [--input FILE | --topology JSON]    Check element availability

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "trackzoom",
    about = "Keep a tracked object centered with a compositor overlay",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (defaults to $XDG_CONFIG_HOME/trackzoom/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Where the processing graph comes from.
#[derive(Args, Debug, Clone)]
pub struct TopologySource {
    /// Video file for the built-in tracking zoom graph
    #[arg(short, long, default_value = "paper.avi", conflicts_with = "topology")]
    input: PathBuf,

    /// JSON topology description
    #[arg(short, long)]
    topology: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Play the pipeline until end-of-stream or error
    Run {
        #[command(flatten)]
        source: TopologySource,
    },

    /// Print the processing graph as a launch line
    Describe {
        #[command(flatten)]
        source: TopologySource,
    },

    /// Check that every element the graph needs is installed
    Check {
        #[command(flatten)]
        source: TopologySource,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => trackzoom_common::config::AppConfig::from_file(path)
            .map_err(|e| anyhow::anyhow!("Failed to load config: {e}"))?,
        None => trackzoom_common::config::AppConfig::load(),
    };
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    trackzoom_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Run { source } => commands::run::run(&source, &config),
        Commands::Describe { source } => commands::describe::run(&source),
        Commands::Check { source } => commands::check::run(&source),
    }
}
