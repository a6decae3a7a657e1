//! Tempest
//!
//! Listens for WeatherFlow hub broadcasts and keeps a live hub/sensor
//! registry until interrupted.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use tempest::config::{Config, LoggingConfig, StorageBackend};
use tempest::network::Network;
use tempest::store::{MemoryStore, RedbStore, Stores};

/// WeatherFlow hub listener
#[derive(Parser, Debug)]
#[command(name = "tempest")]
#[command(about = "WeatherFlow Tempest UDP listener", long_about = None)]
struct Args {
    /// Path to a TOML config file (default: ./tempest.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Interface address to bind (0.0.0.0 listens on all)
    #[arg(long)]
    interface: Option<IpAddr>,

    /// UDP port
    #[arg(long)]
    port: Option<u16>,

    /// Log as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(interface) = args.interface {
        config.network.interface = interface;
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if args.log_json {
        config.logging.json = true;
    }

    init_tracing(&config.logging);

    info!("Starting tempest v{}", env!("CARGO_PKG_VERSION"));

    let stores = match config.storage.backend {
        StorageBackend::Memory => Stores::all(Arc::new(MemoryStore::new())),
        StorageBackend::Redb => {
            let store = RedbStore::open(&config.storage.path).with_context(|| {
                format!("Failed to open store at {}", config.storage.path.display())
            })?;
            Stores::all(Arc::new(store))
        }
    };

    let network = Network::new(config.network.name.clone(), config.network.clone())
        .with_stores(stores);

    if let Err(e) = network.restore().await {
        warn!("Starting with an empty registry: {}", e);
    }

    network.start(config.network.interface).await?;

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = network.shutdown_signalled() => {
            warn!("Ingestion stopped on its own");
        }
    }

    let result = network.stop().await;

    let registry = network.registry();
    info!(
        "Registry: {} hubs, {} sensors",
        registry.hub_count(),
        registry.sensor_count()
    );
    for hub in registry.hubs() {
        info!(
            "  - {} ({}) firmware {}, {} sensors, last seen {}",
            hub.serial,
            hub.address
                .map(|a| a.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            hub.firmware_revision.as_deref().unwrap_or("?"),
            hub.sensors.len(),
            hub.last_seen
        );
    }

    let stats = network.stats();
    info!(
        datagrams = stats.datagrams,
        decoded = stats.decoded,
        dropped = stats.dropped(),
        store_failures = stats.store_failures,
        "Shutdown complete"
    );

    result.map_err(Into::into)
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down...");
        },
    }
}
