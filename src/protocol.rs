//! Wire documents exchanged between agents and the collector
//!
//! Three JSON documents travel over the network:
//!
//! - [`Announcement`]: a single broadcast datagram (default port 5001)
//! - [`StatusReport`]: the whole payload of one pushed connection (default port 5000)
//! - [`PollResponse`]: the body a device returns from its `/status` endpoint
//!
//! Client-asserted timestamps are carried for compatibility but never trusted
//! by the collector; it stamps records with its own receive time.

use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

use crate::error::{MonitorError, MonitorResult};
use crate::registry::{DeviceUpdate, Source};
use crate::util::wire_timestamp;

/// Value of the `type` field in every announcement.
pub const DEVICE_KIND: &str = "zebra_pda";

const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Presence announcement broadcast by an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub device_id: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub timestamp: String,
}

impl Announcement {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            kind: DEVICE_KIND.to_string(),
            timestamp: wire_timestamp(),
        }
    }

    pub fn encode(&self) -> MonitorResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode a datagram, rejecting anything that is not a device announcement.
    pub fn decode(bytes: &[u8]) -> MonitorResult<Self> {
        let announcement: Announcement = serde_json::from_slice(bytes)?;

        if announcement.device_id.trim().is_empty() {
            return Err(MonitorError::malformed("announcement has an empty device_id"));
        }

        if announcement.kind != DEVICE_KIND {
            return Err(MonitorError::malformed(format!(
                "unexpected announcement type '{}'",
                announcement.kind
            )));
        }

        Ok(announcement)
    }

    pub fn into_update(self, sender: IpAddr, received_at: DateTime<Utc>) -> DeviceUpdate {
        DeviceUpdate::new(self.device_id, Source::Broadcast)
            .received_at(received_at)
            .ip(sender)
    }
}

/// Status document pushed by an agent over a fresh connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub device_id: String,

    #[serde(deserialize_with = "deserialize_percent")]
    pub battery_percent: u8,

    pub is_charging: bool,

    pub battery_health: String,

    pub storage_info: String,

    #[serde(default)]
    pub timestamp: String,
}

impl StatusReport {
    pub fn encode(&self) -> MonitorResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> MonitorResult<Self> {
        let report: StatusReport = serde_json::from_slice(bytes)?;

        if report.device_id.trim().is_empty() {
            return Err(MonitorError::malformed("status report has an empty device_id"));
        }

        Ok(report)
    }

    /// Convert into a registry update stamped with the collector's receive time.
    pub fn into_update(self, peer: Option<IpAddr>, received_at: DateTime<Utc>) -> DeviceUpdate {
        let mut update = DeviceUpdate::new(self.device_id, Source::Push)
            .received_at(received_at)
            .battery_percent(self.battery_percent)
            .is_charging(self.is_charging)
            .battery_health(self.battery_health)
            .storage_summary(self.storage_info);

        if let Some(peer) = peer {
            update = update.ip(peer);
        }

        update
    }
}

/// Body of a device's `/status` endpoint
///
/// Both fields are loosely typed: devices in the field report the battery as a
/// number or a numeric string, and storage as free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollResponse {
    #[serde(default)]
    pub battery: Option<Value>,

    #[serde(default)]
    pub storage: Option<Value>,
}

impl PollResponse {
    pub fn new(battery_percent: u8, storage_summary: impl Into<String>) -> Self {
        Self {
            battery: Some(Value::from(battery_percent)),
            storage: Some(Value::from(storage_summary.into())),
        }
    }

    /// Build an enrichment update; fails if neither field carries a usable value.
    pub fn into_update(
        self,
        device_id: impl Into<String>,
        received_at: DateTime<Utc>,
    ) -> MonitorResult<DeviceUpdate> {
        let battery = self.battery.as_ref().and_then(percent_from_value);
        let storage = self.storage.and_then(|value| match value {
            Value::Null => None,
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => Some(text),
            other => Some(other.to_string()),
        });

        if battery.is_none() && storage.is_none() {
            return Err(MonitorError::malformed(
                "status response carries neither battery nor storage",
            ));
        }

        let mut update = DeviceUpdate::new(device_id, Source::Poll).received_at(received_at);
        if let Some(battery) = battery {
            update = update.battery_percent(battery);
        }
        if let Some(storage) = storage {
            update = update.storage_summary(storage);
        }

        Ok(update)
    }
}

/// Round and clamp a battery reading into 0..=100.
pub fn clamp_percent(value: f64) -> Option<u8> {
    if !value.is_finite() {
        return None;
    }
    Some(value.round().clamp(0.0, 100.0) as u8)
}

/// Interpret a loosely typed battery value (number, `"57"`, `"57%"`).
pub fn percent_from_value(value: &Value) -> Option<u8> {
    match value {
        Value::Number(number) => number.as_f64().and_then(clamp_percent),
        Value::String(text) => text
            .trim()
            .trim_end_matches('%')
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(clamp_percent),
        _ => None,
    }
}

fn deserialize_percent<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    clamp_percent(value).ok_or_else(|| de::Error::custom("battery_percent is not a finite number"))
}

/// Format byte counts as `Total: X.YGB, Used: X.YGB, Free: X.YGB`.
pub fn format_storage_summary(total: u64, used: u64, free: u64) -> String {
    let gb = |bytes: u64| bytes as f64 / BYTES_PER_GB;
    format!(
        "Total: {:.1}GB, Used: {:.1}GB, Free: {:.1}GB",
        gb(total),
        gb(used),
        gb(free)
    )
}
