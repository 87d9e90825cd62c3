//! netpulse - Entry Point
//!
//! `netpulse serve` samples the host's connections and serves the dashboard;
//! `netpulse watch` follows a running dashboard over WebSocket.

use anyhow::Result;
use clap::{Parser, Subcommand};
use netpulse_viewer::ViewerConfig;
use tracing::info;

/// Live network connection monitor
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via NETPULSE_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sample connections and serve the dashboard (default)
    Serve,
    /// Follow a running dashboard and log its updates
    Watch {
        /// WebSocket URL (defaults to the configured dashboard address)
        #[arg(long)]
        url: Option<String>,
    },
}

fn load_config(path: Option<String>) -> Result<netpulse_app::AppConfig> {
    // CLI arg > NETPULSE_CONFIG env var > default
    let config_path = path
        .or_else(|| std::env::var("NETPULSE_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let mut config = netpulse_app::AppConfig::from_file(&config_path)?;
    config.apply_env_overrides()?;
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    netpulse_telemetry::init_logging().map_err(netpulse_app::AppError::from)?;

    info!("Starting netpulse v{}", env!("CARGO_PKG_VERSION"));

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let config = load_config(args.config)?;
            info!(
                host = %config.dashboard.host,
                port = config.dashboard.port,
                interval_ms = config.sampler.interval_ms,
                "Configuration loaded"
            );
            netpulse_app::Application::new(config)?.run().await?;
        }
        Command::Watch { url } => {
            let url = match url {
                Some(url) => url,
                None => {
                    let config = load_config(args.config)?;
                    format!("ws://{}/ws", config.dashboard.socket_addr()?)
                }
            };
            netpulse_app::watch(ViewerConfig::with_url(url)).await?;
        }
    }

    Ok(())
}
