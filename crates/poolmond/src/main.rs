//! poolmond - compute-pool monitoring probe
//!
//! Periodically queries a compute pool for slot, job, priority, and cloud
//! instance records, reduces them to hierarchical counters, and delivers
//! the counters to Graphite and/or InfluxDB.

mod config;
mod error;
mod probe;
mod source;

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::DaemonConfig;
use crate::probe::Probe;

#[derive(Parser)]
#[command(name = "poolmond")]
#[command(about = "Compute-pool metrics probe")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "/etc/poolmond/config.toml")]
    config: PathBuf,

    /// Run one cycle and exit
    #[arg(short = '1', long)]
    once: bool,

    /// Log points at debug level instead of sending them; implies one cycle
    #[arg(short, long)]
    test: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Probes to run, overriding the configured list
    probes: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_directives = if cli.debug || cli.test {
        "poolmond=debug,poolmon_core=debug,poolmon_query=debug,poolmon_transport=debug"
    } else {
        "poolmond=info"
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directives)),
        )
        .init();

    info!(config = %cli.config.display(), "starting poolmond");

    let mut config = DaemonConfig::from_file(&cli.config)?;
    if cli.once {
        config.probe.once = true;
    }
    if cli.test {
        config.probe.test = true;
    }
    if !cli.probes.is_empty() {
        config.probe.probes = cli.probes;
        config.validate()?;
    }

    info!(
        pool = %config.pool.name,
        probes = ?config.probe.probes,
        interval = config.probe.interval_secs,
        "loaded config"
    );

    let probe = Probe::new(config)?;
    probe.run().await;

    Ok(())
}
