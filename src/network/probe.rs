//! Host-discovery probes
//!
//! A probe answers "which addresses on this subnet are alive". It does not
//! decide whether a host is a managed device; that is the port classification's
//! job.

use std::net::Ipv4Addr;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::config::ProbeKind;
use crate::error::{MonitorError, MonitorResult};

use super::subnet::LocalSubnet;

static NMAP_UP_HOST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^Host:\s+(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3})\b.*\bStatus:\s+Up\b")
        .expect("static regex is valid")
});

/// Discovers live hosts on a subnet
#[async_trait]
pub trait HostProbe: Send + Sync {
    async fn discover(&self, subnet: &LocalSubnet) -> MonitorResult<Vec<Ipv4Addr>>;

    fn name(&self) -> &'static str;
}

/// Treats every host address as a candidate
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepProbe;

#[async_trait]
impl HostProbe for SweepProbe {
    async fn discover(&self, subnet: &LocalSubnet) -> MonitorResult<Vec<Ipv4Addr>> {
        Ok(subnet.hosts().collect())
    }

    fn name(&self) -> &'static str {
        "sweep"
    }
}

/// Ping sweep through the `nmap` binary (`nmap -sn`)
#[derive(Debug, Clone)]
pub struct NmapProbe {
    binary: String,
}

impl Default for NmapProbe {
    fn default() -> Self {
        Self {
            binary: String::from("nmap"),
        }
    }
}

impl NmapProbe {
    pub fn with_binary(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl HostProbe for NmapProbe {
    #[instrument(skip(self), fields(subnet = %subnet))]
    async fn discover(&self, subnet: &LocalSubnet) -> MonitorResult<Vec<Ipv4Addr>> {
        let output = Command::new(&self.binary)
            .args(["-sn", "-n", "-oG", "-"])
            .arg(subnet.network.to_string())
            .output()
            .await
            .map_err(|e| MonitorError::Discovery(format!("failed to run {}: {e}", self.binary)))?;

        if !output.status.success() {
            return Err(MonitorError::Discovery(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let hosts = parse_grepable(&String::from_utf8_lossy(&output.stdout));
        debug!("nmap reported {} live hosts", hosts.len());

        Ok(hosts
            .into_iter()
            .filter(|host| *host != subnet.interface_addr)
            .collect())
    }

    fn name(&self) -> &'static str {
        "nmap"
    }
}

/// Extract the hosts marked `Up` from nmap's grepable (`-oG`) output.
pub fn parse_grepable(output: &str) -> Vec<Ipv4Addr> {
    let mut hosts: Vec<Ipv4Addr> = NMAP_UP_HOST
        .captures_iter(output)
        .filter_map(|captures| captures[1].parse().ok())
        .collect();
    hosts.sort();
    hosts.dedup();
    hosts
}

pub fn probe_for(kind: ProbeKind) -> Arc<dyn HostProbe> {
    match kind {
        ProbeKind::Nmap => Arc::new(NmapProbe::default()),
        ProbeKind::Sweep => Arc::new(SweepProbe),
    }
}
