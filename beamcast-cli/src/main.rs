//! Beamcast CLI
//!
//! Push live streams to RTMP-family ingest endpoints.
//!
//! # Usage
//!
//! ```bash
//! # Stream a test pattern to Twitch
//! beamcast stream --platform twitch --key live_xxxx
//!
//! # Stream to a custom ingest URL
//! beamcast stream --url rtmp://ingest.example.com/live --key secret
//!
//! # List supported platforms
//! beamcast platforms
//! ```

mod commands;
mod pattern;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::EnvFilter;

/// Beamcast - live push streaming to RTMP-family endpoints
#[derive(Parser)]
#[command(name = "beamcast")]
#[command(version)]
#[command(about = "Push live streams to RTMP-family ingest endpoints", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start streaming to an ingest endpoint
    Stream(commands::StreamArgs),

    /// List supported platform presets
    #[command(alias = "ls")]
    Platforms,

    /// Manage the configuration file
    Config(commands::ConfigArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("beamcast={}", level).parse()?),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Stream(args) => commands::stream(args).await?,
        Commands::Platforms => commands::platforms().await?,
        Commands::Config(args) => commands::config(args).await?,
    }

    Ok(())
}
