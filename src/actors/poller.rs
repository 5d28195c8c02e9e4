//! StatusPoller - best-effort enrichment of discovered devices
//!
//! The poller pulls battery and storage values from a device that the scanner
//! found. Each way of asking a device is an [`Enricher`]; the poller tries them
//! in order and merges the first answer. When every enricher fails the registry
//! record is left exactly as it was.
//!
//! ## Message Flow
//!
//! ```text
//! Scanner → Enrich(target) → spawn poll → Enricher(s) → DeviceRegistry::merge
//!                ↑
//!                └─── Commands (EnrichNow, Shutdown)
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, instrument, trace, warn};

use crate::config::PollConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::protocol::PollResponse;
use crate::registry::{DeviceRecord, DeviceRegistry, DeviceUpdate};

use super::messages::{PollTarget, PollerCommand};

/// One way of fetching status from a device
#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich(&self, target: &PollTarget) -> MonitorResult<DeviceUpdate>;

    fn name(&self) -> &'static str;
}

/// GET `<path>` on the port that accepted during classification
pub struct HttpStatusEnricher {
    client: reqwest::Client,
    path: String,
}

impl HttpStatusEnricher {
    pub fn new(config: &PollConfig) -> MonitorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        let path = if config.path.starts_with('/') {
            config.path.clone()
        } else {
            format!("/{}", config.path)
        };

        Ok(Self { client, path })
    }

    pub fn status_url(&self, addr: SocketAddr) -> String {
        let scheme = match addr.port() {
            443 | 8443 => "https",
            _ => "http",
        };
        format!("{scheme}://{addr}{}", self.path)
    }
}

#[async_trait]
impl Enricher for HttpStatusEnricher {
    async fn enrich(&self, target: &PollTarget) -> MonitorResult<DeviceUpdate> {
        let url = self.status_url(target.addr);
        trace!("requesting status from {url}");

        let response = self.client.get(&url).send().await?;

        if !response.status().is_success() {
            return Err(MonitorError::Http(format!(
                "{url} answered {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        let received_at = Utc::now();
        let status: PollResponse = serde_json::from_str(&body)?;

        status.into_update(target.device_id.clone(), received_at)
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// Runs enrichers against a target and merges the first success
pub struct StatusPoller {
    registry: DeviceRegistry,
    enrichers: Vec<Arc<dyn Enricher>>,
}

impl StatusPoller {
    pub fn new(registry: DeviceRegistry, enrichers: Vec<Arc<dyn Enricher>>) -> Self {
        Self {
            registry,
            enrichers,
        }
    }

    /// Poller with the built-in HTTP enricher.
    pub fn http(registry: DeviceRegistry, config: &PollConfig) -> MonitorResult<Self> {
        let enricher: Arc<dyn Enricher> = Arc::new(HttpStatusEnricher::new(config)?);
        Ok(Self::new(registry, vec![enricher]))
    }

    #[instrument(skip(self), fields(device = %target.device_id, addr = %target.addr))]
    pub async fn poll(&self, target: &PollTarget) -> MonitorResult<DeviceRecord> {
        let mut last_error = None;

        for enricher in &self.enrichers {
            match enricher.enrich(target).await {
                Ok(update) => {
                    debug!("enriched via {}", enricher.name());
                    return Ok(self.registry.merge(update));
                }
                Err(e) => {
                    debug!("{} enrichment failed: {e}", enricher.name());
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| MonitorError::Http(String::from("no enrichers configured"))))
    }
}

/// Actor wrapping a [`StatusPoller`]
///
/// Queued enrichments run as independent tasks so one slow device never delays
/// another.
pub struct PollerActor {
    poller: Arc<StatusPoller>,
    command_rx: mpsc::Receiver<PollerCommand>,
    in_flight: JoinSet<()>,
}

impl PollerActor {
    pub fn new(poller: StatusPoller, command_rx: mpsc::Receiver<PollerCommand>) -> Self {
        Self {
            poller: Arc::new(poller),
            command_rx,
            in_flight: JoinSet::new(),
        }
    }

    #[instrument(skip(self))]
    pub async fn run(mut self) {
        debug!("starting poller actor");

        loop {
            tokio::select! {
                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        PollerCommand::Enrich(target) => {
                            let poller = Arc::clone(&self.poller);
                            self.in_flight.spawn(async move {
                                if let Err(e) = poller.poll(&target).await {
                                    debug!("skipping enrichment of {}: {e}", target.device_id);
                                }
                            });
                        }

                        PollerCommand::EnrichNow { target, respond_to } => {
                            let result = self
                                .poller
                                .poll(&target)
                                .await
                                .with_context(|| format!("failed to enrich {}", target.device_id));
                            let _ = respond_to.send(result);
                        }

                        PollerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                // reap finished polls
                Some(joined) = self.in_flight.join_next(), if !self.in_flight.is_empty() => {
                    if let Err(e) = joined {
                        warn!("poll task failed: {e}");
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        self.in_flight.detach_all();
        debug!("poller actor stopped");
    }
}

/// Handle for controlling a [`PollerActor`]
#[derive(Clone)]
pub struct PollerHandle {
    sender: mpsc::Sender<PollerCommand>,
}

impl PollerHandle {
    pub fn spawn(poller: StatusPoller) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(256);
        tokio::spawn(PollerActor::new(poller, cmd_rx).run());
        Self { sender: cmd_tx }
    }

    /// Queue an enrichment without waiting for its outcome.
    pub async fn enrich(&self, target: PollTarget) -> Result<()> {
        self.sender
            .send(PollerCommand::Enrich(target))
            .await
            .context("failed to send Enrich command")
    }

    pub async fn enrich_now(&self, target: PollTarget) -> Result<DeviceRecord> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(PollerCommand::EnrichNow {
                target,
                respond_to: tx,
            })
            .await
            .context("failed to send EnrichNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(PollerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")
    }
}
