//! # shardsync
//!
//! Coordinator binary: loads settings, starts the sync service, the status
//! endpoint and the operator console, and shuts everything down on `quit` or
//! ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use shardsync_server::{Console, ShutdownCoordinator, SyncService, WsConnector};
use shardsync_settings::SyncSettings;
use tokio::io::BufReader;
use tokio::net::TcpListener;

/// Shard-sync coordinator.
#[derive(Parser, Debug)]
#[command(name = "shardsync", about = "Cluster registry, routing and rate-limit sync coordinator")]
struct Cli {
    /// Settings file (defaults to `~/.shardsync/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Start and auto-connect clusters without waiting for `start`.
    #[arg(long)]
    autostart: bool,

    /// Do not read commands from stdin.
    #[arg(long)]
    no_console: bool,
}

fn load(cli: &Cli) -> Result<SyncSettings> {
    let path = cli.config.clone().unwrap_or_else(shardsync_settings::settings_path);
    shardsync_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    shardsync_core::logging::init_subscriber(level, settings.logging.json);

    let metrics = match shardsync_server::metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            tracing::warn!(error = %e, "metrics recorder not installed");
            None
        }
    };

    let connector = Arc::new(WsConnector::new(settings.coordinator.channel_buffer));
    let service = SyncService::new(&settings, connector).context("Failed to build sync service")?;
    let shutdown = ShutdownCoordinator::new();

    if let Some(pump) = service.spawn_pump(shutdown.token()) {
        shutdown.track("pump", pump);
    }
    if let Some(refresh) = service.spawn_shard_refresh(shutdown.token()) {
        shutdown.track("shard_refresh", refresh);
    }

    if settings.status.enabled {
        let addr = format!("{}:{}", settings.status.host, settings.status.port);
        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind status endpoint on {addr}"))?;
        let router = shardsync_server::status::router(Arc::clone(service.context()), metrics);
        let token = shutdown.token();
        shutdown.track(
            "status",
            tokio::spawn(async move {
                if let Err(e) = shardsync_server::status::serve(listener, router, token).await {
                    tracing::error!(error = %e, "status endpoint failed");
                }
            }),
        );
    }

    if cli.autostart || settings.coordinator.autostart {
        drop(service.start().await);
    }

    if !cli.no_console {
        let console = Console::new(Arc::clone(service.context()), shutdown.token());
        shutdown.track(
            "console",
            tokio::spawn(async move { console.run(BufReader::new(tokio::io::stdin())).await }),
        );
    }

    tracing::info!(
        clusters = settings.clusters.len(),
        handlers = service.registry().tags().len(),
        "shardsync coordinator running"
    );

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for ctrl-c")?;
        }
        () = shutdown.cancelled() => {}
    }

    tracing::info!("Shutting down...");
    shutdown
        .graceful_shutdown(Some(Duration::from_millis(settings.coordinator.shutdown_timeout_ms)))
        .await;
    service.shutdown();
    tracing::info!("Shutdown complete");
    Ok(())
}
