use std::net::SocketAddr;

use anyhow::Context;
use clap::Parser;
use pda_monitor::{
    DeviceRegistry, RegistryEvent,
    actors::{
        listener::{PayloadLimits, StatusListener},
        poller::{PollerHandle, StatusPoller},
        presence::PresenceListener,
        scanner::{ScannerHandle, ScannerOptions},
    },
    config::{CollectorConfig, read_config_file},
    network::probe_for,
    util::display_timestamp,
};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: Option<String>,

    #[arg(long)]
    status_port: Option<u16>,

    #[arg(long)]
    broadcast_port: Option<u16>,

    /// Seconds between subnet sweeps
    #[arg(long)]
    scan_interval: Option<u64>,

    /// Disable periodic sweeps (on-demand sweeps stay available)
    #[arg(long)]
    no_scan: bool,

    /// Serve the registry API on this address
    #[arg(long)]
    api: Option<SocketAddr>,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("pda_monitor", LevelFilter::TRACE),
        ("pda_collector", LevelFilter::TRACE),
        ("tower_http", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

fn get_config(args: &Args) -> anyhow::Result<CollectorConfig> {
    let mut config = match &args.file {
        Some(file) => read_config_file::<CollectorConfig>(file)?,
        None => CollectorConfig::default(),
    };

    if let Some(port) = args.status_port {
        config.status_port = port;
    }
    if let Some(port) = args.broadcast_port {
        config.broadcast_port = port;
    }
    if let Some(interval) = args.scan_interval {
        config.scan.interval = interval;
    }
    if args.no_scan {
        config.scan.enabled = false;
    }
    if let Some(addr) = args.api {
        let mut api = config.api.take().unwrap_or_default();
        api.bind_addr = addr;
        config.api = Some(api);
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = get_config(&args)?;
    let registry = DeviceRegistry::new();
    let cancel = CancellationToken::new();

    tokio::spawn(log_registry_events(registry.clone()));

    let listener = StatusListener::bind(
        config.status_listen_addr(),
        registry.clone(),
        PayloadLimits::from(&config),
    )
    .await
    .with_context(|| format!("failed to bind status listener on {}", config.status_listen_addr()))?;
    tokio::spawn(listener.run(cancel.child_token()));

    let presence = PresenceListener::bind(config.broadcast_listen_addr(), registry.clone())
        .await
        .with_context(|| {
            format!(
                "failed to bind presence listener on {}",
                config.broadcast_listen_addr()
            )
        })?;
    tokio::spawn(presence.run(cancel.child_token()));

    let poller = PollerHandle::spawn(
        StatusPoller::http(registry.clone(), &config.poll)
            .context("failed to build status poller")?,
    );

    // always running: `scan.enabled` only gates the periodic timer
    let scanner = ScannerHandle::spawn(
        ScannerOptions::new(config.scan.clone(), &config.device_prefix),
        registry.clone(),
        probe_for(config.scan.probe),
        poller.clone(),
    );
    if !config.scan.enabled {
        info!("periodic scanning disabled, sweeps run on demand only");
    }

    #[cfg(feature = "api")]
    {
        use pda_monitor::api::{ApiConfig, ApiState, spawn_api_server};

        if let Some(settings) = &config.api {
            let state = ApiState::new(registry.clone(), scanner.clone(), config.scan.enabled);
            spawn_api_server(ApiConfig::from(settings), state).await?;
        }
    }

    info!("collector running, press ctrl-c to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    cancel.cancel();

    if let Err(e) = scanner.shutdown().await {
        warn!("{:#}", e);
    }
    if let Err(e) = poller.shutdown().await {
        warn!("{:#}", e);
    }

    for record in registry.snapshot() {
        debug!(
            "{} last seen {} via {}",
            record.device_id,
            display_timestamp(&record.last_update),
            record.source
        );
    }

    Ok(())
}

/// Hand registry changes to the log until the registry is dropped.
#[instrument(skip_all)]
async fn log_registry_events(registry: DeviceRegistry) {
    let mut events = registry.subscribe();
    drop(registry);

    loop {
        match events.recv().await {
            Ok(RegistryEvent::DeviceAdded(record)) => info!(
                "new device {} at {} via {}",
                record.device_id,
                record
                    .ip
                    .map(|ip| ip.to_string())
                    .unwrap_or_else(|| String::from("unknown address")),
                record.source
            ),
            Ok(RegistryEvent::DeviceUpdated(record)) => debug!(
                "device {} updated via {} (battery {:?}, storage {:?})",
                record.device_id, record.source, record.battery_percent, record.storage_summary
            ),
            Err(RecvError::Lagged(skipped)) => warn!("event log skipped {skipped} updates"),
            Err(RecvError::Closed) => break,
        }
    }
}
