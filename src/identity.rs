//! Stable device identity for the agent
//!
//! The id is derived once at startup from the MAC address of the first
//! non-loopback interface. Without one, a random per-session id is used; such a
//! device shows up as a new registry entry after every restart.

use sysinfo::Networks;
use tracing::{debug, warn};

/// Resolve the device id as `<prefix>-<hardware id>`.
pub fn resolve_device_id(prefix: &str) -> String {
    match hardware_id() {
        Some(hardware_id) => {
            let device_id = format_device_id(prefix, &hardware_id);
            debug!("derived device id {device_id} from hardware address");
            device_id
        }
        None => {
            let device_id = random_device_id(prefix);
            warn!("no stable hardware address found, using session id {device_id}");
            device_id
        }
    }
}

pub fn format_device_id(prefix: &str, hardware_id: &str) -> String {
    format!("{prefix}-{hardware_id}")
}

/// Hex-encode a MAC address without separators, e.g. `a0b1c2d3e4f5`.
pub fn mac_to_hardware_id(mac: [u8; 6]) -> Option<String> {
    if mac.iter().all(|byte| *byte == 0) {
        return None;
    }
    Some(mac.iter().map(|byte| format!("{byte:02x}")).collect())
}

pub fn random_device_id(prefix: &str) -> String {
    let session = uuid::Uuid::new_v4().simple().to_string();
    format_device_id(prefix, &session[..8])
}

fn hardware_id() -> Option<String> {
    let networks = Networks::new_with_refreshed_list();

    let mut interfaces: Vec<_> = networks.list().iter().collect();
    interfaces.sort_by(|(a, _), (b, _)| a.cmp(b));

    interfaces
        .into_iter()
        .filter(|(_, data)| {
            !data
                .ip_networks()
                .iter()
                .any(|network| network.addr.is_loopback())
        })
        .find_map(|(_, data)| mac_to_hardware_id(data.mac_address().0))
}
