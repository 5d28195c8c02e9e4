use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use anyhow::Context;
use serde::de::DeserializeOwned;
use tracing::{trace, warn};

/// Configuration of the agent running on a handheld device
#[derive(Debug, Clone, serde::Deserialize)]
pub struct AgentConfig {
    /// Address of the collector receiving status pushes
    #[serde(default = "default_collector_addr")]
    pub collector_addr: IpAddr,

    #[serde(default = "default_status_port")]
    pub status_port: u16,

    #[serde(default = "default_broadcast_port")]
    pub broadcast_port: u16,

    /// Destination of presence datagrams (limited broadcast by default)
    #[serde(default = "default_broadcast_addr")]
    pub broadcast_addr: Ipv4Addr,

    /// Seconds between presence announcements
    #[serde(default = "default_broadcast_interval")]
    pub broadcast_interval: u64,

    /// Seconds between status pushes
    #[serde(default = "default_report_interval")]
    pub report_interval: u64,

    /// Seconds to wait after a failed broadcast or push
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff: u64,

    /// Seconds allowed for connecting to the collector
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default = "crate::util::get_device_prefix")]
    pub device_prefix: String,

    /// Device-side status endpoint polled by the collector (`null` disables it)
    #[serde(default = "default_status_http")]
    pub status_http: Option<StatusHttpConfig>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            collector_addr: default_collector_addr(),
            status_port: default_status_port(),
            broadcast_port: default_broadcast_port(),
            broadcast_addr: default_broadcast_addr(),
            broadcast_interval: default_broadcast_interval(),
            report_interval: default_report_interval(),
            retry_backoff: default_retry_backoff(),
            connect_timeout: default_connect_timeout(),
            device_prefix: crate::util::get_device_prefix(),
            status_http: default_status_http(),
        }
    }
}

impl AgentConfig {
    pub fn collector_endpoint(&self) -> SocketAddr {
        SocketAddr::new(self.collector_addr, self.status_port)
    }

    pub fn broadcast_target(&self) -> SocketAddr {
        SocketAddr::new(IpAddr::V4(self.broadcast_addr), self.broadcast_port)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct StatusHttpConfig {
    #[serde(default = "default_any_addr")]
    pub addr: IpAddr,

    #[serde(default = "default_status_http_port")]
    pub port: u16,
}

impl Default for StatusHttpConfig {
    fn default() -> Self {
        Self {
            addr: default_any_addr(),
            port: default_status_http_port(),
        }
    }
}

/// Configuration of the central collector
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CollectorConfig {
    #[serde(default = "default_any_addr")]
    pub bind_addr: IpAddr,

    #[serde(default = "default_status_port")]
    pub status_port: u16,

    #[serde(default = "default_broadcast_port")]
    pub broadcast_port: u16,

    /// Upper bound on a single pushed status document
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Seconds allowed for a pushing agent to deliver its payload
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,

    #[serde(default = "crate::util::get_device_prefix")]
    pub device_prefix: String,

    #[serde(default)]
    pub scan: ScanConfig,

    #[serde(default)]
    pub poll: PollConfig,

    /// Read-only JSON API (disabled if absent)
    pub api: Option<ApiSettings>,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_any_addr(),
            status_port: default_status_port(),
            broadcast_port: default_broadcast_port(),
            max_payload_bytes: default_max_payload_bytes(),
            read_timeout: default_read_timeout(),
            device_prefix: crate::util::get_device_prefix(),
            scan: ScanConfig::default(),
            poll: PollConfig::default(),
            api: None,
        }
    }
}

impl CollectorConfig {
    pub fn status_listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.status_port)
    }

    pub fn broadcast_listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.broadcast_port)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout)
    }
}

/// Host-discovery probe used by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeKind {
    /// Ping sweep through the external `nmap` binary
    Nmap,

    /// Treat every address of the subnet as live and let the port check decide
    #[default]
    Sweep,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ScanConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between sweeps
    #[serde(default = "default_scan_interval")]
    pub interval: u64,

    /// Ports tried in order when classifying a host
    #[serde(default = "default_candidate_ports")]
    pub ports: Vec<u16>,

    #[serde(default = "default_port_timeout_ms")]
    pub port_timeout_ms: u64,

    /// Hosts classified concurrently during a sweep
    #[serde(default = "default_scan_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub probe: ProbeKind,

    /// Force a prefix length instead of the interface's own (24 restores the legacy sweep)
    pub prefix_override: Option<u8>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_scan_interval(),
            ports: default_candidate_ports(),
            port_timeout_ms: default_port_timeout_ms(),
            concurrency: default_scan_concurrency(),
            probe: ProbeKind::default(),
            prefix_override: None,
        }
    }
}

impl ScanConfig {
    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.port_timeout_ms)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_path")]
    pub path: String,

    #[serde(default = "default_poll_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            path: default_poll_path(),
            timeout_ms: default_poll_timeout_ms(),
        }
    }
}

impl PollConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_api_addr")]
    pub bind_addr: SocketAddr,

    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_addr: default_api_addr(),
            enable_cors: true,
        }
    }
}

fn default_collector_addr() -> IpAddr {
    collector_addr_or_localhost(crate::util::get_collector_addr())
}

/// Parse a collector address from the environment, falling back to localhost.
fn collector_addr_or_localhost(raw: Option<String>) -> IpAddr {
    let fallback = IpAddr::V4(Ipv4Addr::LOCALHOST);

    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|e| {
            warn!("ignoring PDA_COLLECTOR_ADDR {raw:?} ({e}), using {fallback}");
            fallback
        }),
        None => fallback,
    }
}

fn default_any_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_broadcast_addr() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}

fn default_status_port() -> u16 {
    5000
}

fn default_broadcast_port() -> u16 {
    5001
}

fn default_status_http() -> Option<StatusHttpConfig> {
    Some(StatusHttpConfig::default())
}

fn default_status_http_port() -> u16 {
    8080
}

fn default_broadcast_interval() -> u64 {
    30
}

fn default_report_interval() -> u64 {
    60
}

fn default_retry_backoff() -> u64 {
    5
}

fn default_connect_timeout() -> u64 {
    5
}

fn default_max_payload_bytes() -> usize {
    64 * 1024
}

fn default_read_timeout() -> u64 {
    10
}

fn default_scan_interval() -> u64 {
    300
}

fn default_candidate_ports() -> Vec<u16> {
    vec![80, 443, 8080, 8443]
}

fn default_port_timeout_ms() -> u64 {
    1000
}

fn default_scan_concurrency() -> usize {
    64
}

fn default_poll_path() -> String {
    String::from("/status")
}

fn default_poll_timeout_ms() -> u64 {
    1000
}

fn default_api_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8088)
}

fn default_true() -> bool {
    true
}

pub fn read_config_file<T>(path: &str) -> anyhow::Result<T>
where
    T: DeserializeOwned + std::fmt::Debug,
{
    let file_content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {path}"))?;
    serde_json::from_str(&file_content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
        .inspect(|config| trace!("loaded config: {config:?}"))
}
