//! rrdpolld - the long-running SNMP collector
//!
//! Loads the configuration directory, builds the polling engine and runs
//! until SIGINT/SIGTERM, persisting samples to RRD and raw files.

use anyhow::{Context, Result};
use clap::Parser;
use rrdpoll_core::config::{self, LoadOptions};
use rrdpoll_core::engine::{Engine, EngineOptions};
use rrdpoll_core::logging::{self, LoggingOptions};
use rrdpoll_core::persist::FilePersist;
use std::path::PathBuf;
use tracing::info;

/// SNMP polling daemon writing samples into RRD and raw files
#[derive(Parser, Debug)]
#[command(name = "rrdpolld")]
#[command(about = "SNMP polling daemon writing samples into RRD and raw files")]
#[command(version)]
struct Args {
    /// Configuration directory, one file per poll definition
    #[arg(short, long, default_value = "/etc/rrdpoll")]
    config_dir: PathBuf,

    /// Directory for default RRD files (<config-name>.rrd)
    #[arg(short = 'd', long, default_value = "/var/lib/rrdpoll")]
    rrd_dir: PathBuf,

    /// SNMP packet retries per request
    #[arg(short, long, default_value_t = 3)]
    retries: u32,

    /// Default per-poll timeout in seconds
    #[arg(short, long, default_value_t = 5)]
    timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log format (pretty, compact, json)
    #[arg(long, default_value = "compact")]
    log_format: String,

    /// Log file (daily rotation); stderr when unset
    #[arg(long)]
    log_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::validate_log_level(&args.log_level)?;
    logging::validate_log_format(&args.log_format)?;
    logging::init_tracing(&LoggingOptions {
        level: args.log_level.clone(),
        format: args.log_format.clone(),
        file: args.log_file.clone(),
    })?;

    let groups = config::load_dir(
        &args.config_dir,
        &LoadOptions {
            rrd_dir: args.rrd_dir.clone(),
            default_timeout_secs: args.timeout,
        },
    )
    .with_context(|| format!("loading configuration from {}", args.config_dir.display()))?;

    let n_items: usize = groups.iter().map(|group| group.items.len()).sum();
    info!(
        groups = groups.len(),
        items = n_items,
        config_dir = %args.config_dir.display(),
        "configuration loaded"
    );

    let options = EngineOptions {
        retries: args.retries,
        ..EngineOptions::default()
    };
    let mut engine = Engine::new(options, groups, Box::new(FilePersist))
        .await
        .context("starting snmp engine")?;

    let stop = engine.stop_handle();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown signal received");
        stop.stop();
    });

    info!("rrdpolld running");
    engine.run().await?;
    engine.shutdown();
    info!("rrdpolld stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
