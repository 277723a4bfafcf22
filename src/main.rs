//! Archiver binary: load config, wire the core, run until interrupted

use anyhow::Result;
use clap::Parser;
use fiscal_archiver::config::Settings;
use fiscal_archiver::ArchiverCore;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "archiver", about = "Fiscal XML ingestion and archiving")]
struct Cli {
    /// Path to a TOML config file; environment variables override it
    #[arg(long, env = "ARCHIVER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "fiscal_archiver={log_level},archiver={log_level}"
        ))
    });
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let settings = Settings::load(cli.config.as_deref())?;
    let core = ArchiverCore::bootstrap(settings).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, finishing in-flight batch");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => error!("failed to listen for interrupt: {e}"),
        }
    });

    core.run(shutdown_rx).await
}
