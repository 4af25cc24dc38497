//! tcp-relay binary entry point.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

use tcp_relay::config::{AppConfig, BasicValidator, ConfigLoader, LogLevel, SelfRelayValidator};
use tcp_relay::logging;
use tcp_relay::module::ModuleContract;
use tcp_relay::modules::relay::RelayHandler;

#[derive(Parser, Debug)]
#[command(name = "tcp-relay")]
#[command(version)]
#[command(about = "Single-threaded TCP relay to a fixed upstream target")]
struct Cli {
    /// Path to configuration file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override listen port
    #[arg(long)]
    listen_port: Option<u16>,

    /// Override upstream host
    #[arg(long)]
    upstream_host: Option<String>,

    /// Override upstream port
    #[arg(long)]
    upstream_port: Option<u16>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<LogLevel>,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(port) = self.listen_port {
            config.relay.listen_port = port;
        }
        if let Some(host) = &self.upstream_host {
            config.relay.upstream_host = host.clone();
        }
        if let Some(port) = self.upstream_port {
            config.relay.upstream_port = port;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConfigLoader::new()
            .load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?,
        None => AppConfig::default(),
    };
    cli.apply_overrides(&mut config);

    logging::init(&config.logging)?;

    let config = ConfigLoader::new()
        .with_validator(BasicValidator::new())
        .with_validator(SelfRelayValidator::new())
        .validated(config)
        .context("invalid configuration")?;

    info!(version = env!("CARGO_PKG_VERSION"), "Starting tcp-relay");

    let mut handler = RelayHandler::default();
    handler
        .init(config.relay)
        .context("invalid relay configuration")?;

    if let Err(e) = handler.start() {
        error!(error = %e, "Relay failed to start");
        return Err(e).context("failed to start relay");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;
    let signal = runtime
        .block_on(shutdown_signal())
        .context("failed to install signal handlers")?;
    info!(signal, "Shutdown signal received");

    handler.stop().context("relay did not stop cleanly")?;

    let stats = handler.stats();
    info!(
        sessions = stats.total_sessions(),
        bytes_to_upstream = stats.total_bytes_to_upstream(),
        bytes_to_downstream = stats.total_bytes_to_downstream(),
        "tcp-relay stopped"
    );
    Ok(())
}

/// SIGABRT; the same number on Linux, the BSDs and macOS.
#[cfg(unix)]
const SIGABRT: i32 = 6;

/// Wait for SIGINT, SIGTERM or SIGABRT.
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        let mut abort = signal(SignalKind::from_raw(SIGABRT))?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
            _ = terminate.recv() => Ok("SIGTERM"),
            _ = abort.recv() => Ok("SIGABRT"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("ctrl-c")
    }
}
