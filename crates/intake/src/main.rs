mod commands;

use std::net::IpAddr;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use intake::config::{DEFAULT_CONFIG_PATH, StoreBackend};

// ============================================================================
// CLI Types
// ============================================================================

/// Intake - durable, turn-based collection of confirmed user details
#[derive(Parser, Debug)]
#[command(version = intake::build_info::VERSION, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,

        /// Host to bind to (overrides config file)
        #[arg(long)]
        host: Option<IpAddr>,

        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Store backend [memory, redis, sqlite, postgres] (overrides config file)
        #[arg(long)]
        backend: Option<StoreBackend>,
    },

    /// Delete expired sessions and event markers once, then exit
    Sweep {
        /// Path to configuration file
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        config: String,

        /// Store backend (overrides config file)
        #[arg(long)]
        backend: Option<StoreBackend>,
    },
}

// ============================================================================
// Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> std::process::ExitCode {
    init_tracing();

    match run().await {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            host,
            port,
            backend,
        } => commands::serve::run(&config, host, port, backend).await,
        Commands::Sweep { config, backend } => commands::sweep::run(&config, backend).await,
    }
}

// ============================================================================
// Initialization
// ============================================================================

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
