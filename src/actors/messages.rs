//! Message types for actor communication
//!
//! 1. **Commands**: sent to one actor over its mpsc channel
//! 2. **Replies**: returned through a oneshot channel embedded in the command
//! 3. **Registry events** live in [`crate::registry`]; they are the only fan-out

use std::net::{IpAddr, SocketAddr};

use serde::Serialize;
use tokio::sync::oneshot;

use crate::registry::DeviceRecord;

/// Commands that can be sent to the NetworkScanner
#[derive(Debug)]
pub enum ScannerCommand {
    /// Run a sweep immediately, outside the interval timer
    ScanNow {
        respond_to: oneshot::Sender<anyhow::Result<ScanReport>>,
    },

    /// Change the sweep period; takes effect from the next tick
    UpdateInterval { interval_secs: u64 },

    /// Finish the current sweep (if any) and stop
    Shutdown,
}

/// Commands that can be sent to the StatusPoller
#[derive(Debug)]
pub enum PollerCommand {
    /// Queue a best-effort enrichment; the caller does not wait
    Enrich(PollTarget),

    /// Enrich and report the outcome
    EnrichNow {
        target: PollTarget,
        respond_to: oneshot::Sender<anyhow::Result<DeviceRecord>>,
    },

    /// Stop accepting work; in-flight polls run to completion
    Shutdown,
}

/// A device the poller should try to enrich
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollTarget {
    pub device_id: String,

    /// Address and port that accepted during classification
    pub addr: SocketAddr,
}

/// Outcome of one sweep
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Subnet in CIDR notation
    pub subnet: String,

    /// Hosts the discovery probe reported alive
    pub live_hosts: usize,

    /// Hosts classified as devices for the first time during this sweep
    pub newly_classified: usize,

    /// Every device merged during this sweep
    pub devices: Vec<ScannedDevice>,

    /// Hosts skipped because of an error
    pub errors: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedDevice {
    pub device_id: String,
    pub ip: IpAddr,
    pub port: u16,
}
