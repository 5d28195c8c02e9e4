//! PresenceBroadcaster - periodic presence announcements from the agent

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::AgentConfig;
use crate::error::MonitorResult;
use crate::protocol::Announcement;

pub struct PresenceBroadcaster {
    device_id: String,
    target: SocketAddr,
    interval: Duration,
    retry_backoff: Duration,
}

impl PresenceBroadcaster {
    pub fn new(device_id: impl Into<String>, config: &AgentConfig) -> Self {
        Self {
            device_id: device_id.into(),
            target: config.broadcast_target(),
            interval: Duration::from_secs(config.broadcast_interval),
            retry_backoff: Duration::from_secs(config.retry_backoff),
        }
    }

    pub fn with_target(mut self, target: SocketAddr) -> Self {
        self.target = target;
        self
    }

    pub fn with_interval(mut self, interval: Duration, retry_backoff: Duration) -> Self {
        self.interval = interval;
        self.retry_backoff = retry_backoff;
        self
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    /// Open a socket that may send to broadcast addresses.
    pub async fn open_socket() -> MonitorResult<UdpSocket> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        Ok(socket)
    }

    /// Send a single announcement datagram.
    pub async fn announce(&self, socket: &UdpSocket) -> MonitorResult<usize> {
        let datagram = Announcement::new(&self.device_id).encode()?;
        Ok(socket.send_to(&datagram, self.target).await?)
    }

    /// Announce every interval until cancelled; failures wait the retry backoff.
    #[instrument(skip_all, fields(device_id = %self.device_id, target = %self.target))]
    pub async fn run(self, cancel: CancellationToken) {
        info!("broadcasting presence every {:?}", self.interval);

        let mut socket: Option<UdpSocket> = None;

        loop {
            let delay = match self.tick(&mut socket).await {
                Ok(sent) => {
                    trace!("announced presence ({sent} bytes)");
                    self.interval
                }
                Err(e) => {
                    warn!("presence broadcast failed: {:#}", e);
                    // a socket in an error state is reopened on the next attempt
                    socket = None;
                    self.retry_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("presence broadcaster cancelled");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn tick(&self, socket: &mut Option<UdpSocket>) -> MonitorResult<usize> {
        let socket = match socket {
            Some(socket) => socket,
            None => socket.insert(Self::open_socket().await?),
        };
        self.announce(socket).await
    }
}
