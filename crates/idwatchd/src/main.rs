//! idwatchd: the idwatch daemon.
//!
//! Single binary that assembles the monitor:
//! - Service registry from the TOML config
//! - Health store
//! - Backup manager
//! - Health monitor (poll loop)
//! - Status API
//!
//! # Usage
//!
//! ```text
//! idwatchd run --config /etc/idwatch/idwatch.toml
//! idwatchd once --config idwatch.toml
//! idwatchd snapshot --config idwatch.toml auth-service
//! ```

mod daemon;

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,idwatchd=debug,idwatch=debug";

#[derive(Parser)]
#[command(name = "idwatchd", about = "idwatch health monitor daemon")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the poll loop and the status API until Ctrl-C.
    Run {
        /// Path to the TOML config file.
        #[arg(long, short)]
        config: PathBuf,

        /// Override `monitor.listen` from the config.
        #[arg(long)]
        listen: Option<SocketAddr>,
    },

    /// Probe every service once and print the stats JSON.
    Once {
        #[arg(long, short)]
        config: PathBuf,
    },

    /// Snapshot one service's database and print the outcome.
    Snapshot {
        #[arg(long, short)]
        config: PathBuf,

        /// Service name as configured.
        service: String,
    },

    /// Validate the config and print it with defaults filled in.
    CheckConfig {
        #[arg(long, short)]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Command::Run { config, listen } => daemon::run(&config, listen).await,
        Command::Once { config } => daemon::once(&config).await,
        Command::Snapshot { config, service } => daemon::snapshot(&config, &service).await,
        Command::CheckConfig { config } => daemon::check_config(&config),
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}
