use chrono::{DateTime, Local, Utc};

/// Wire format of the `timestamp` field in announcements and status pushes.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn wire_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

pub fn display_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp
        .with_timezone(&Local)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

const COLLECTOR_ADDR: &str = "PDA_COLLECTOR_ADDR";

pub fn get_collector_addr() -> Option<String> {
    std::env::var(COLLECTOR_ADDR).ok()
}

const DEVICE_PREFIX: &str = "PDA_DEVICE_PREFIX";

const DEFAULT_DEVICE_PREFIX: &str = "Zebra";

pub fn get_default_device_prefix() -> String {
    DEFAULT_DEVICE_PREFIX.to_string()
}

pub fn get_device_prefix() -> String {
    std::env::var(DEVICE_PREFIX)
        .ok()
        .filter(|prefix| !prefix.trim().is_empty())
        .unwrap_or_else(get_default_device_prefix)
}
