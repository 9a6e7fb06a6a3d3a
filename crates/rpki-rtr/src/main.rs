//! rtr-server - RPKI-to-Router cache server
//!
//! Loads validated ROAs from a validator JSON export, refreshes them on an
//! interval and serves them to routers over RTR (RFC 6810 / RFC 8210).
//!
//! Settings come from an optional JSON configuration file; command line
//! flags override the file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use rpki_rtr::store::RtrCache;
use rpki_rtr::{JsonFileSource, RefreshAdapter, RtrServer, ServerConfig};

#[derive(Parser, Debug)]
#[command(name = "rtr-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on for router connections
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Path to the validator JSON export
    #[arg(long)]
    source: Option<PathBuf>,

    /// Seconds between refreshes from the source
    #[arg(long)]
    refresh_interval: Option<u64>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn server_config(&self) -> Result<ServerConfig> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path).context("failed to load configuration")?,
            None => ServerConfig::default(),
        };
        if let Some(bind) = self.bind {
            config.bind = bind;
        }
        if let Some(source) = &self.source {
            config.source = Some(source.clone());
        }
        if let Some(secs) = self.refresh_interval {
            config.refresh_interval_secs = secs;
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = args.server_config()?;
    let Some(source_path) = config.source.clone() else {
        bail!("no validation source configured; pass --source or set \"source\" in the configuration file");
    };

    let cache = Arc::new(RtrCache::new(config.retention.clone(), config.notify_capacity));
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let refresh = RefreshAdapter::new(cache.clone(), Arc::new(JsonFileSource::new(source_path)));
    let refresh_task = tokio::spawn(refresh.run(config.refresh_interval(), shutdown_rx.clone()));

    let server = RtrServer::new(cache, config.session.to_session_config());
    let serve_task = {
        let server = server.clone();
        let bind = config.bind;
        tokio::spawn(async move { server.bind_and_serve(bind, shutdown_rx).await })
    };

    tokio::select! {
        result = shutdown_signal() => result.context("failed to listen for shutdown signal")?,
        finished = serve_task => {
            // The accept loop only ends on its own when binding fails.
            finished
                .context("server task panicked")?
                .with_context(|| format!("failed to serve on {}", config.bind))?;
        }
    }

    info!(clients = server.registry().len(), "shutting down");
    let _ = shutdown_tx.send(true);
    if let Err(error) = refresh_task.await {
        warn!(%error, "refresh task ended abnormally");
    }
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
