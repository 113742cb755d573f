mod cmd;
mod sim;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "matchcue",
    about = "Fire time-relative OSC cues at show devices during live competition matches",
    version,
    propagate_version = true
)]
struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the competition API and fire configured cues
    Run {
        /// Path to the configuration file
        config: PathBuf,

        /// Don't contact the real API; run against a built-in simulated
        /// competition starting now
        #[arg(long)]
        simulate: bool,
    },

    /// Validate the configuration and exit
    Check {
        /// Path to the configuration file
        config: PathBuf,
    },

    /// Fire every configured abort action once, then exit
    TestAbort {
        /// Path to the configuration file
        config: PathBuf,
    },

    /// Serve a simulated competition API for rehearsals
    Simulate {
        /// Port to bind on
        #[arg(short, long, default_value = "8008")]
        port: u16,

        /// Seconds to wait before the first match slot
        #[arg(long, default_value = "0")]
        start_delay: f64,

        /// Match number of the first match
        #[arg(long, default_value = "0")]
        start_match: u32,

        /// Highest match number to serve
        #[arg(long)]
        end_match: Option<u32>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Run { config, simulate } => cmd::run::run(&config, simulate).await,
        Commands::Check { config } => cmd::check::run(&config),
        Commands::TestAbort { config } => cmd::abort::run(&config).await,
        Commands::Simulate {
            port,
            start_delay,
            start_match,
            end_match,
        } => cmd::simulate::run(port, start_delay, start_match, end_match).await,
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
