//! NetworkScanner - periodic subnet sweep for devices that never announced themselves
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → detect subnet → HostProbe → classify new hosts → merge {id, ip, scan}
//!     ↑                                                               │
//!     └─── Commands (ScanNow, UpdateInterval, Shutdown)               └─→ StatusPoller (enrich)
//! ```
//!
//! Hosts that were classified once are remembered by the actor and skip the
//! port check on later sweeps, but they are still re-merged and re-enriched
//! whenever the probe reports them alive. The sweep never waits for
//! enrichment.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::{StreamExt, stream};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Interval, MissedTickBehavior, interval};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::config::ScanConfig;
use crate::network::{Candidate, HostProbe, LocalSubnet, classify_host};
use crate::registry::{DeviceRegistry, DeviceUpdate, Source};

use super::messages::{PollTarget, ScanReport, ScannedDevice, ScannerCommand};
use super::poller::PollerHandle;

/// Device id for a host that was only ever seen by a sweep, e.g. `Zebra-192-168-1-42`.
pub fn synthesize_device_id(prefix: &str, ip: Ipv4Addr) -> String {
    format!("{prefix}-{}", ip.to_string().replace('.', "-"))
}

/// Sweeps can outlast the interval; a late tick waits a full period instead of firing a burst.
fn sweep_ticker(period: Duration) -> Interval {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

/// Everything a scanner needs besides its collaborators
#[derive(Debug, Clone)]
pub struct ScannerOptions {
    pub scan: ScanConfig,

    pub device_prefix: String,

    /// Sweep this subnet instead of detecting one from the local interfaces
    pub subnet: Option<LocalSubnet>,
}

impl ScannerOptions {
    pub fn new(scan: ScanConfig, device_prefix: impl Into<String>) -> Self {
        Self {
            scan,
            device_prefix: device_prefix.into(),
            subnet: None,
        }
    }

    pub fn with_subnet(mut self, subnet: LocalSubnet) -> Self {
        self.subnet = Some(subnet);
        self
    }
}

pub struct ScannerActor {
    options: ScannerOptions,

    registry: DeviceRegistry,

    probe: Arc<dyn HostProbe>,

    poller: PollerHandle,

    command_rx: mpsc::Receiver<ScannerCommand>,

    /// Hosts already classified, with the port that accepted
    known: HashMap<Ipv4Addr, Candidate>,

    interval_duration: Duration,
}

impl ScannerActor {
    pub fn new(
        options: ScannerOptions,
        registry: DeviceRegistry,
        probe: Arc<dyn HostProbe>,
        poller: PollerHandle,
        command_rx: mpsc::Receiver<ScannerCommand>,
    ) -> Self {
        let interval_duration = Duration::from_secs(options.scan.interval.max(1));

        Self {
            options,
            registry,
            probe,
            poller,
            command_rx,
            known: HashMap::new(),
            interval_duration,
        }
    }

    /// Run until a Shutdown command arrives or every handle is dropped.
    ///
    /// Periodic sweeps only happen when scanning is enabled; on-demand sweeps
    /// are always served.
    #[instrument(skip(self), fields(probe = self.probe.name()))]
    pub async fn run(mut self) {
        debug!("starting scanner actor");

        let periodic = self.options.scan.enabled;
        let mut ticker = sweep_ticker(self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick(), if periodic => {
                    match self.sweep().await {
                        Ok(report) => info!(
                            "sweep of {} found {} live hosts, {} devices",
                            report.subnet,
                            report.live_hosts,
                            report.devices.len()
                        ),
                        Err(e) => error!("sweep failed: {:#}", e),
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        ScannerCommand::ScanNow { respond_to } => {
                            debug!("received ScanNow command");
                            let result = self.sweep().await;
                            let _ = respond_to.send(result);
                        }

                        ScannerCommand::UpdateInterval { interval_secs } => {
                            debug!("updating interval to {interval_secs}s");
                            self.interval_duration = Duration::from_secs(interval_secs.max(1));
                            ticker = sweep_ticker(self.interval_duration);
                        }

                        ScannerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("scanner actor stopped");
    }

    fn subnet(&self) -> Result<LocalSubnet> {
        match self.options.subnet {
            Some(subnet) => Ok(subnet),
            None => LocalSubnet::detect(self.options.scan.prefix_override)
                .context("could not determine local network"),
        }
    }

    /// One full sweep: discover, classify new hosts, merge and hand off.
    ///
    /// Failures on a single host are logged and counted; only failing to find
    /// the subnet or the live hosts aborts the sweep.
    #[instrument(skip(self))]
    async fn sweep(&mut self) -> Result<ScanReport> {
        let subnet = self.subnet()?;
        trace!("sweeping {subnet}");

        let live = self
            .probe
            .discover(&subnet)
            .await
            .with_context(|| format!("host discovery on {subnet} failed"))?;

        let mut report = ScanReport {
            subnet: subnet.to_string(),
            live_hosts: live.len(),
            ..ScanReport::default()
        };

        let (known, unknown): (Vec<Ipv4Addr>, Vec<Ipv4Addr>) =
            live.into_iter().partition(|ip| self.known.contains_key(ip));

        let ports = Arc::new(self.options.scan.ports.clone());
        let per_port = self.options.scan.port_timeout();

        let classified: Vec<_> = stream::iter(unknown)
            .map(|ip| {
                let ports = Arc::clone(&ports);
                async move {
                    let outcome =
                        tokio::spawn(async move { classify_host(ip, &ports, per_port).await })
                            .await;
                    (ip, outcome)
                }
            })
            .buffer_unordered(self.options.scan.concurrency.max(1))
            .collect()
            .await;

        let mut candidates: Vec<Candidate> = known
            .iter()
            .filter_map(|ip| self.known.get(ip).copied())
            .collect();

        for (ip, outcome) in classified {
            match outcome {
                Ok(Some(candidate)) => {
                    debug!("classified {ip} as a device (port {})", candidate.port);
                    self.known.insert(ip, candidate);
                    report.newly_classified += 1;
                    candidates.push(candidate);
                }
                Ok(None) => trace!("{ip} has no candidate port open"),
                Err(e) => {
                    warn!("classification of {ip} failed: {e}");
                    report.errors += 1;
                }
            }
        }

        for candidate in candidates {
            match self.register(candidate).await {
                Ok(device) => report.devices.push(device),
                Err(e) => {
                    warn!("skipping {}: {:#}", candidate.ip, e);
                    report.errors += 1;
                }
            }
        }

        Ok(report)
    }

    async fn register(&self, candidate: Candidate) -> Result<ScannedDevice> {
        let ip = IpAddr::V4(candidate.ip);

        let device_id = self
            .registry
            .find_by_ip(ip)
            .unwrap_or_else(|| synthesize_device_id(&self.options.device_prefix, candidate.ip));

        self.registry
            .merge(DeviceUpdate::new(device_id.clone(), Source::Scan).ip(ip));

        self.poller
            .enrich(PollTarget {
                device_id: device_id.clone(),
                addr: candidate.socket_addr(),
            })
            .await
            .context("enrichment hand-off failed")?;

        Ok(ScannedDevice {
            device_id,
            ip,
            port: candidate.port,
        })
    }
}

/// Handle for controlling a [`ScannerActor`]
#[derive(Clone)]
pub struct ScannerHandle {
    sender: mpsc::Sender<ScannerCommand>,
}

impl ScannerHandle {
    pub fn spawn(
        options: ScannerOptions,
        registry: DeviceRegistry,
        probe: Arc<dyn HostProbe>,
        poller: PollerHandle,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = ScannerActor::new(options, registry, probe, poller, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Sweep immediately and wait for the report.
    pub async fn scan_now(&self) -> Result<ScanReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(ScannerCommand::ScanNow { respond_to: tx })
            .await
            .context("failed to send ScanNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn update_interval(&self, interval_secs: u64) -> Result<()> {
        self.sender
            .send(ScannerCommand::UpdateInterval { interval_secs })
            .await
            .context("failed to send UpdateInterval command")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(ScannerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}
