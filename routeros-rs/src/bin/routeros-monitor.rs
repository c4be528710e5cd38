use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use routeros_rs::{Monitor, MonitorConfig};
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Samples interface traffic of a RouterOS device.
#[derive(Debug, Parser)]
#[command(name = "routeros-monitor", version, about)]
struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, default_value = "routeros-monitor.toml")]
    config: PathBuf,

    /// Override the device address.
    #[arg(long)]
    address: Option<String>,

    /// Override the monitored interfaces (repeatable).
    #[arg(short, long = "interface")]
    interfaces: Vec<String>,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!(config = %cli.config.display(), error = %e, "invalid configuration");
            return ExitCode::FAILURE;
        }
    };
    info!(address = %config.address, interfaces = ?config.interfaces, "starting monitor");

    let (samples_tx, mut samples) = mpsc::channel(64);
    let monitor = tokio::spawn(Monitor::new(config, samples_tx).run());

    loop {
        tokio::select! {
            sample = samples.recv() => match sample {
                Some(sample) => println!("{sample}"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        }
    }

    // Dropping the receiver stops the monitor at its next tick
    drop(samples);
    let _ = monitor.await;
    ExitCode::SUCCESS
}

fn load_config(cli: &Cli) -> Result<MonitorConfig, routeros_rs::ConfigError> {
    let mut config = MonitorConfig::load(&cli.config)?;
    if let Some(address) = &cli.address {
        config.address = address.clone();
    }
    if !cli.interfaces.is_empty() {
        config.interfaces = cli.interfaces.clone();
    }
    config.validate()?;
    Ok(config)
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn,routeros_monitor=info,routeros_rs=info",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();
}
