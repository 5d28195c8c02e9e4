//! PresenceListener - receives agent announcements on the broadcast port
//!
//! Each datagram that decodes as a device announcement creates or refreshes the
//! device's record with the sender's address.

use std::net::SocketAddr;

use chrono::Utc;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::MonitorResult;
use crate::protocol::Announcement;
use crate::registry::{DeviceRecord, DeviceRegistry};

/// Announcements are a few hundred bytes; anything longer is truncated and rejected.
const MAX_DATAGRAM: usize = 2048;

pub struct PresenceListener {
    socket: UdpSocket,
    registry: DeviceRegistry,
}

impl PresenceListener {
    pub async fn bind(addr: SocketAddr, registry: DeviceRegistry) -> MonitorResult<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self { socket, registry })
    }

    pub fn local_addr(&self) -> MonitorResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    #[instrument(skip_all, fields(addr = ?self.socket.local_addr().ok()))]
    pub async fn run(self, cancel: CancellationToken) {
        info!("presence listener waiting for announcements");

        let mut buf = vec![0u8; MAX_DATAGRAM];

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("presence listener cancelled");
                    break;
                }

                received = self.socket.recv_from(&mut buf) => {
                    match received {
                        Ok((len, sender)) => match handle_datagram(&buf[..len], sender, &self.registry) {
                            Ok(record) => trace!("announcement from {sender} for {}", record.device_id),
                            Err(e) => warn!("dropping datagram from {sender}: {e}"),
                        },
                        Err(e) => warn!("failed to receive datagram: {e}"),
                    }
                }
            }
        }
    }
}

pub fn handle_datagram(
    datagram: &[u8],
    sender: SocketAddr,
    registry: &DeviceRegistry,
) -> MonitorResult<DeviceRecord> {
    let received_at = Utc::now();
    let announcement = Announcement::decode(datagram)?;
    Ok(registry.merge(announcement.into_update(sender.ip(), received_at)))
}
