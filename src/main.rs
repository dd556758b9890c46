//! HTTP play trigger.
//!
//! Waits for a door intercom or camera to `POST /play` a body containing a
//! media URL, then hands that URL to the configured player.
//!
//! # Architecture Overview
//!
//! ```text
//!   config file ──▶ loader ──▶ validation ──▶ ServerConfig
//!        │                                        │
//!   watcher (notify) ─────── reload ─────────────▶│ restart
//!                                                 ▼
//!   Client ──▶ net::listener ──▶ http::session ──▶ extract ──▶ playback sink
//!          ◀──────────── response (200/400/404/405/500), close
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::mpsc;

use play_trigger::config::watcher::ConfigWatcher;
use play_trigger::config::{load_config, normalize_port, resolve_config, Overrides, TriggerConfig};
use play_trigger::lifecycle::Shutdown;
use play_trigger::observability::{init_logging, metrics};
use play_trigger::playback::sink_from_config;
use play_trigger::TriggerServer;

#[derive(Parser)]
#[command(name = "play-trigger")]
#[command(about = "Start media playback from a single HTTP POST", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listening port; overrides the file.
    #[arg(short, long, value_parser = parse_port)]
    port: Option<u16>,

    /// URL pattern; overrides the file.
    #[arg(long)]
    pattern: Option<String>,

    /// Do not publish a discovery record.
    #[arg(long)]
    no_discovery: bool,

    /// Reload and restart when the configuration file changes.
    #[arg(short, long, requires = "config")]
    watch: bool,
}

fn parse_port(text: &str) -> Result<u16, String> {
    normalize_port(text).map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();
    let cli = Cli::parse();

    tracing::info!("play-trigger v{} starting", env!("CARGO_PKG_VERSION"));

    let overrides = Overrides {
        port: cli.port,
        pattern: cli.pattern.clone(),
        no_discovery: cli.no_discovery,
    };

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => TriggerConfig::default(),
    };
    overrides.apply(&mut config);
    let server_config = resolve_config(&config)?;

    tracing::info!(
        port = server_config.port,
        pattern = %server_config.pattern,
        discovery = server_config.discovery.is_some(),
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = Arc::new(TriggerServer::new(sink_from_config(&config.playback)));
    let mut status = server.subscribe_status();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let current = status.borrow_and_update().clone();
            tracing::info!(status = %current, "Server status changed");
        }
    });

    // A failed initial bind is not fatal while watching: a corrected file can still restart it.
    if let Err(e) = server.start(server_config).await {
        if !cli.watch {
            return Err(e.into());
        }
        tracing::error!(error = %e, "Initial start failed; waiting for a configuration change");
    }

    let (mut updates, _watcher) = match cli.config.as_deref().filter(|_| cli.watch) {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path, overrides);
            (updates, Some(watcher.run()?))
        }
        None => {
            let (_, updates) = mpsc::unbounded_channel();
            (updates, None)
        }
    };

    let shutdown = Shutdown::new();
    let mut shutdown_rx = shutdown.subscribe();
    let _signals = shutdown.trigger_on_signal();

    loop {
        tokio::select! {
            Some(next) = updates.recv() => {
                tracing::info!(port = next.port, "Applying new configuration");
                if let Err(e) = server.restart(next).await {
                    tracing::error!(error = %e, "Restart failed");
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }

    server.stop().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
