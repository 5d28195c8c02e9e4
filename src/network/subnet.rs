use std::fmt;
use std::net::{IpAddr, Ipv4Addr};

use ipnet::Ipv4Net;
use sysinfo::Networks;
use tracing::{trace, warn};

use crate::error::{MonitorError, MonitorResult};

/// Prefix assumed by older collectors for every interface.
pub const LEGACY_PREFIX: u8 = 24;

/// Shorter prefixes are narrowed to [`LEGACY_PREFIX`] so a sweep stays bounded.
pub const MIN_SWEEP_PREFIX: u8 = 20;

/// Network address of `ip` under `mask`, computed octet by octet.
pub fn network_address(ip: Ipv4Addr, mask: Ipv4Addr) -> Ipv4Addr {
    let ip = ip.octets();
    let mask = mask.octets();
    Ipv4Addr::new(
        ip[0] & mask[0],
        ip[1] & mask[1],
        ip[2] & mask[2],
        ip[3] & mask[3],
    )
}

/// The subnet the collector sweeps, anchored at one of its own addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalSubnet {
    /// The collector's own address on this subnet
    pub interface_addr: Ipv4Addr,

    pub network: Ipv4Net,
}

impl LocalSubnet {
    pub fn from_prefix(
        interface_addr: Ipv4Addr,
        prefix: u8,
        prefix_override: Option<u8>,
    ) -> MonitorResult<Self> {
        let mut prefix = prefix_override.unwrap_or(prefix);

        if prefix < MIN_SWEEP_PREFIX {
            warn!(
                "/{prefix} on {interface_addr} is too wide to sweep, narrowing to /{LEGACY_PREFIX}"
            );
            prefix = LEGACY_PREFIX;
        }

        let mask = Ipv4Net::new(interface_addr, prefix)
            .map_err(|e| MonitorError::Discovery(format!("invalid prefix /{prefix}: {e}")))?
            .netmask();
        let network = Ipv4Net::new(network_address(interface_addr, mask), prefix)
            .map_err(|e| MonitorError::Discovery(format!("invalid prefix /{prefix}: {e}")))?;

        Ok(Self {
            interface_addr,
            network,
        })
    }

    pub fn from_netmask(
        interface_addr: Ipv4Addr,
        netmask: Ipv4Addr,
        prefix_override: Option<u8>,
    ) -> MonitorResult<Self> {
        let prefix = ipnet::ipv4_mask_to_prefix(netmask)
            .map_err(|_| MonitorError::Discovery(format!("non-contiguous netmask {netmask}")))?;
        Self::from_prefix(interface_addr, prefix, prefix_override)
    }

    /// Pick the first non-loopback, non-link-local IPv4 address, by interface name.
    pub fn detect(prefix_override: Option<u8>) -> MonitorResult<Self> {
        let networks = Networks::new_with_refreshed_list();

        let mut interfaces: Vec<_> = networks.list().iter().collect();
        interfaces.sort_by(|(a, _), (b, _)| a.cmp(b));

        for (name, data) in interfaces {
            for network in data.ip_networks() {
                let IpAddr::V4(addr) = network.addr else {
                    continue;
                };
                if addr.is_loopback() || addr.is_link_local() || addr.is_unspecified() {
                    continue;
                }

                trace!("using interface {name} ({addr}/{})", network.prefix);
                return Self::from_prefix(addr, network.prefix, prefix_override);
            }
        }

        Err(MonitorError::Discovery(String::from(
            "no active non-loopback IPv4 interface",
        )))
    }

    pub fn network_addr(&self) -> Ipv4Addr {
        self.network.network()
    }

    pub fn netmask(&self) -> Ipv4Addr {
        self.network.netmask()
    }

    /// Host addresses of the subnet, without the collector's own address.
    pub fn hosts(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.network
            .hosts()
            .filter(move |host| *host != self.interface_addr)
    }
}

impl fmt::Display for LocalSubnet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.network)
    }
}
