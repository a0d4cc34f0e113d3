//! The pumpwatch daemon: loads settings, assembles the monitor and runs
//! the acquisition pipeline until interrupted.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pumpwatch_core::{PumpMonitor, Settings};
use pumpwatch_types::format_real;

#[derive(Parser, Debug)]
#[command(name = "pumpwatch")]
#[command(about = "Cyclic pump data acquisition with state-change event detection")]
struct Args {
    /// Path to a settings file (TOML); merged with PUMPWATCH_* env vars
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the database URL from the settings
    #[arg(long)]
    database_url: Option<String>,

    /// Override the sampling interval in milliseconds
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Log a one-line system summary after every completed cycle
    #[arg(long)]
    log_cycles: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut settings = Settings::load(args.config.as_deref())?;
    if let Some(url) = args.database_url {
        settings.database_url = url;
    }
    if let Some(interval) = args.interval_ms {
        settings.sample_interval_ms = interval;
    }

    if !settings.simulate {
        // No controller transport is wired into the daemon yet; embedders
        // supply one through MonitorBuilder::reader.
        warn!(
            host = %settings.controller.host,
            "controller mode not wired in this binary, using simulated data"
        );
    }

    let monitor = PumpMonitor::builder(settings).build().await?;
    info!(
        pumps = monitor.catalog().pump_count(),
        endpoint = %monitor.connection_status().endpoint,
        "monitor assembled"
    );

    monitor.start();

    if args.log_cycles {
        let mut updates = monitor.subscribe();
        tokio::spawn(async move {
            while let Some(summary) = updates.recv().await {
                info!(
                    alarm = summary.alarm,
                    pumps = summary.setpoints.len(),
                    first_setpoint = %summary
                        .setpoints
                        .values()
                        .next()
                        .map(|sp| format_real(*sp, "bar"))
                        .unwrap_or_default(),
                    "cycle complete"
                );
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested, stopping sampler");
    monitor.shutdown().await;
    info!("goodbye");
    Ok(())
}
