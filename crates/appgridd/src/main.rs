//! appgridd: the appgrid daemon.
//!
//! Single binary that assembles the appgrid subsystems around one state
//! store:
//! - Appset store (redb)
//! - Scheduler bridge (simulated in-process scheduler)
//! - Appset manager
//! - Stale-state sweeper
//! - Alert-driven repair
//!
//! # Usage
//!
//! ```text
//! appgridd --config /etc/appgrid/appgrid.toml run
//! appgridd import shop ./shop.json --start
//! appgridd check-scale 5 /shop/web --max 4 --min 1
//! ```

mod commands;
mod standalone;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use appgrid_core::AppgridConfig;
use appgrid_core::config::{StoreConfig, SweeperConfig};

const DEFAULT_LOG_FILTER: &str = "info,appgridd=debug,appgrid=debug";

#[derive(Parser)]
#[command(name = "appgridd", about = "appgrid daemon")]
struct Cli {
    /// Path to appgrid.toml. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the state store location.
    #[arg(long, global = true)]
    store_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the sweeper and the alert intake until interrupted.
    Run {
        /// Sweep interval in seconds.
        #[arg(long)]
        sweep_interval: Option<u64>,

        /// Read JSON alerts, one per line, from stdin.
        #[arg(long)]
        alerts_from_stdin: bool,
    },
    /// Create an appset from a group tree in a JSON file.
    Import {
        name: String,
        file: PathBuf,

        #[arg(long, default_value = "")]
        description: String,

        /// Deploy the appset right after creating it.
        #[arg(long)]
        start: bool,
    },
    /// Run one sweep pass and exit.
    Sweep,
    /// Evaluate a scale request against instance bounds.
    CheckScale {
        scale: String,
        app: String,

        #[arg(long, default_value = "")]
        max: String,

        #[arg(long, default_value = "")]
        min: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppgridConfig::from_file(path)?,
        None => AppgridConfig::default(),
    };
    if let Some(path) = cli.store_path {
        config.store = Some(StoreConfig { path: Some(path) });
    }

    init_tracing(config.json_logs());

    match cli.command {
        Command::Run {
            sweep_interval,
            alerts_from_stdin,
        } => {
            if let Some(secs) = sweep_interval {
                let sweeper = config.sweeper.get_or_insert(SweeperConfig {
                    interval_secs: None,
                    stale_after_secs: None,
                });
                sweeper.interval_secs = Some(secs);
            }
            standalone::run(config, alerts_from_stdin).await
        }
        Command::Import {
            name,
            file,
            description,
            start,
        } => commands::import(&config, name, &file, description, start).await,
        Command::Sweep => commands::sweep(&config),
        Command::CheckScale {
            scale,
            app,
            max,
            min,
        } => commands::check_scale(&scale, &app, &max, &min),
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
