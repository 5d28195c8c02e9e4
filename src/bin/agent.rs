use std::net::IpAddr;
use std::sync::Arc;

use clap::Parser;
use pda_monitor::{
    agent::{spawn_agent, status},
    config::{AgentConfig, read_config_file},
    identity::resolve_device_id,
    sensors::{SensorSource, SystemSensors},
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short, long)]
    file: Option<String>,

    /// Collector address receiving status pushes
    #[arg(long)]
    collector: Option<IpAddr>,

    #[arg(long)]
    status_port: Option<u16>,

    #[arg(long)]
    broadcast_port: Option<u16>,

    /// Do not serve the device-side status endpoint
    #[arg(long)]
    no_status_http: bool,
}

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("pda_monitor", LevelFilter::TRACE),
        ("pda_agent", LevelFilter::TRACE),
        ("rocket", LevelFilter::INFO),
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

fn get_config(args: &Args) -> anyhow::Result<AgentConfig> {
    let mut config = match &args.file {
        Some(file) => read_config_file::<AgentConfig>(file)?,
        None => AgentConfig::default(),
    };

    if let Some(collector) = args.collector {
        config.collector_addr = collector;
    }
    if let Some(port) = args.status_port {
        config.status_port = port;
    }
    if let Some(port) = args.broadcast_port {
        config.broadcast_port = port;
    }
    if args.no_status_http {
        config.status_http = None;
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();
    trace!("started with args: {args:?}");

    let config = get_config(&args)?;
    let device_id = resolve_device_id(&config.device_prefix);
    info!(
        "agent {device_id} reporting to {}",
        config.collector_endpoint()
    );

    let sensors: Arc<dyn SensorSource> = Arc::new(SystemSensors);
    let cancel = CancellationToken::new();

    let tasks = spawn_agent(&device_id, &config, Arc::clone(&sensors), &cancel);

    if let Some(http) = &config.status_http {
        let server = status::build(http, Arc::clone(&sensors));
        tokio::spawn(async move {
            if let Err(e) = server.launch().await {
                error!("status endpoint failed: {e}");
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    cancel.cancel();
    let failed = tasks.join().await;
    if failed > 0 {
        warn!("{failed} agent task(s) did not stop cleanly");
    }

    Ok(())
}
