//! StatusListener - accepts status documents pushed by agents
//!
//! Every accepted connection is handled on its own task: the whole payload is
//! read until the agent closes its side, decoded as a [`StatusReport`] and
//! merged with the collector's receive time. A bad payload only costs its own
//! connection.

use std::net::SocketAddr;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::CollectorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::protocol::StatusReport;
use crate::registry::{DeviceRecord, DeviceRegistry};

/// Bounds applied to every pushed payload
#[derive(Debug, Clone, Copy)]
pub struct PayloadLimits {
    pub max_bytes: usize,
    pub read_timeout: Duration,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        let config = CollectorConfig::default();
        Self::from(&config)
    }
}

impl From<&CollectorConfig> for PayloadLimits {
    fn from(config: &CollectorConfig) -> Self {
        Self {
            max_bytes: config.max_payload_bytes,
            read_timeout: config.read_timeout(),
        }
    }
}

pub struct StatusListener {
    listener: TcpListener,
    registry: DeviceRegistry,
    limits: PayloadLimits,
}

impl StatusListener {
    pub async fn bind(
        addr: SocketAddr,
        registry: DeviceRegistry,
        limits: PayloadLimits,
    ) -> MonitorResult<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            registry,
            limits,
        })
    }

    pub fn local_addr(&self) -> MonitorResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `cancel` fires.
    #[instrument(skip_all, fields(addr = ?self.listener.local_addr().ok()))]
    pub async fn run(self, cancel: CancellationToken) {
        info!("status listener accepting pushes");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("status listener cancelled");
                    break;
                }

                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let registry = self.registry.clone();
                            let limits = self.limits;
                            tokio::spawn(async move {
                                match handle_connection(stream, peer, &registry, limits).await {
                                    Ok(record) => trace!(
                                        "merged push from {peer} for {}",
                                        record.device_id
                                    ),
                                    Err(e @ MonitorError::MalformedPayload(_)) => {
                                        warn!("dropping push from {peer}: {e}")
                                    }
                                    Err(e) => warn!("push from {peer} failed: {e}"),
                                }
                            });
                        }
                        Err(e) => {
                            warn!("failed to accept connection: {e}");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
            }
        }
    }
}

/// Read, decode and merge one pushed status document.
pub async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    registry: &DeviceRegistry,
    limits: PayloadLimits,
) -> MonitorResult<DeviceRecord> {
    let payload = read_payload(&mut stream, limits).await?;
    let received_at = Utc::now();

    let report = StatusReport::decode(&payload)?;
    Ok(registry.merge(report.into_update(Some(peer.ip()), received_at)))
}

/// Read until EOF, refusing payloads that are empty, oversized or too slow.
pub async fn read_payload<R>(reader: &mut R, limits: PayloadLimits) -> MonitorResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut payload = Vec::new();
    let cap = limits.max_bytes as u64 + 1;

    timeout(
        limits.read_timeout,
        reader.take(cap).read_to_end(&mut payload),
    )
    .await??;

    if payload.len() > limits.max_bytes {
        return Err(MonitorError::malformed(format!(
            "payload exceeds {} bytes",
            limits.max_bytes
        )));
    }

    if payload.is_empty() {
        return Err(MonitorError::malformed("empty payload"));
    }

    Ok(payload)
}
