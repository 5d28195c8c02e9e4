//! DeviceRegistry - the collector's authoritative map of known devices
//!
//! Every producer (StatusListener, PresenceListener, NetworkScanner,
//! StatusPoller) feeds the registry through [`DeviceRegistry::merge`]. A merge
//! only overwrites the fields its [`DeviceUpdate`] carries and never moves
//! `last_update` backwards.
//!
//! ## Locking
//!
//! Records live in a sharded `DashMap`. A merge holds the write lock of the
//! record's shard for the duration of the field copy, so two merges for the same
//! device are serialised while merges for different devices rarely contend.
//! Readers clone records under the shard read lock and therefore never observe
//! a half-applied merge.
//!
//! ## Change notifications
//!
//! After each merge the updated record is published on a broadcast channel.
//! Events are sent while the record's entry is still locked, so events for one
//! device arrive in merge order and the first is always `DeviceAdded`.
//! This is the hand-off to presentation code: subscribers receive owned copies
//! and never touch registry state directly. Lagging subscribers lose events but
//! can always fall back to [`DeviceRegistry::snapshot`].
//!
//! Records are never evicted; a device that goes silent stays listed with its
//! last known values.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace};

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Which producer contributed the most recent merge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Broadcast,
    Push,
    Scan,
    Poll,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Source::Broadcast => "broadcast",
            Source::Push => "push",
            Source::Scan => "scan",
            Source::Poll => "poll",
        };
        f.write_str(name)
    }
}

/// Last known state of one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub ip: Option<IpAddr>,
    pub battery_percent: Option<u8>,
    pub is_charging: Option<bool>,
    pub battery_health: Option<String>,
    pub storage_summary: Option<String>,
    pub last_update: DateTime<Utc>,
    pub source: Source,
}

impl DeviceRecord {
    fn from_update(update: &DeviceUpdate) -> Self {
        let mut record = Self {
            device_id: update.device_id.clone(),
            ip: None,
            battery_percent: None,
            is_charging: None,
            battery_health: None,
            storage_summary: None,
            last_update: update.received_at,
            source: update.source,
        };
        record.apply(update);
        record
    }

    /// Copy every field present in `update`, leaving the rest untouched.
    pub fn apply(&mut self, update: &DeviceUpdate) {
        if let Some(ip) = update.ip {
            self.ip = Some(ip);
        }
        if let Some(battery) = update.battery_percent {
            self.battery_percent = Some(battery);
        }
        if let Some(charging) = update.is_charging {
            self.is_charging = Some(charging);
        }
        if let Some(health) = &update.battery_health {
            self.battery_health = Some(health.clone());
        }
        if let Some(storage) = &update.storage_summary {
            self.storage_summary = Some(storage.clone());
        }

        self.last_update = self.last_update.max(update.received_at);
        self.source = update.source;
    }
}

/// Partial update contributed by a single producer
///
/// Only `Some` fields are written by a merge. `received_at` should be the
/// collector's receive time, never a time asserted by the device.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceUpdate {
    pub device_id: String,
    pub source: Source,
    pub received_at: DateTime<Utc>,
    pub ip: Option<IpAddr>,
    pub battery_percent: Option<u8>,
    pub is_charging: Option<bool>,
    pub battery_health: Option<String>,
    pub storage_summary: Option<String>,
}

impl DeviceUpdate {
    pub fn new(device_id: impl Into<String>, source: Source) -> Self {
        Self {
            device_id: device_id.into(),
            source,
            received_at: Utc::now(),
            ip: None,
            battery_percent: None,
            is_charging: None,
            battery_health: None,
            storage_summary: None,
        }
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = received_at;
        self
    }

    pub fn ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    pub fn battery_percent(mut self, battery_percent: u8) -> Self {
        self.battery_percent = Some(battery_percent);
        self
    }

    pub fn is_charging(mut self, is_charging: bool) -> Self {
        self.is_charging = Some(is_charging);
        self
    }

    pub fn battery_health(mut self, battery_health: impl Into<String>) -> Self {
        self.battery_health = Some(battery_health.into());
        self
    }

    pub fn storage_summary(mut self, storage_summary: impl Into<String>) -> Self {
        self.storage_summary = Some(storage_summary.into());
        self
    }
}

/// Event published after every merge
///
/// Per device, events follow merge order; the first one is always `DeviceAdded`.
#[derive(Debug, Clone)]
pub enum RegistryEvent {
    /// First sighting of a device
    DeviceAdded(DeviceRecord),

    /// An existing record changed
    DeviceUpdated(DeviceRecord),
}

impl RegistryEvent {
    pub fn record(&self) -> &DeviceRecord {
        match self {
            RegistryEvent::DeviceAdded(record) | RegistryEvent::DeviceUpdated(record) => record,
        }
    }
}

/// Shared, cloneable handle to the device map
#[derive(Clone)]
pub struct DeviceRegistry {
    records: Arc<DashMap<String, DeviceRecord>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            records: Arc::new(DashMap::new()),
            events,
        }
    }

    /// Merge a partial update, creating the record on first sighting.
    ///
    /// Returns a copy of the record as it stands after the merge.
    pub fn merge(&self, update: DeviceUpdate) -> DeviceRecord {
        // the entry guard lives until the end of this function, covering the send
        let (record, created, _guard) = match self.records.entry(update.device_id.clone()) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().apply(&update);
                (entry.get().clone(), false, entry.into_ref())
            }
            Entry::Vacant(entry) => {
                let guard = entry.insert(DeviceRecord::from_update(&update));
                (guard.clone(), true, guard)
            }
        };

        trace!(device = %record.device_id, source = %update.source, created, "merged update");

        let event = if created {
            debug!(device = %record.device_id, source = %update.source, "new device");
            RegistryEvent::DeviceAdded(record.clone())
        } else {
            RegistryEvent::DeviceUpdated(record.clone())
        };

        // no subscribers is fine, the snapshot stays authoritative
        let _ = self.events.send(event);

        record
    }

    /// Point-in-time copy of every record, ordered by device id.
    pub fn snapshot(&self) -> Vec<DeviceRecord> {
        let mut records: Vec<DeviceRecord> = self
            .records
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        records
    }

    pub fn get(&self, device_id: &str) -> Option<DeviceRecord> {
        self.records.get(device_id).map(|entry| entry.value().clone())
    }

    /// Id of the device last seen at `ip`, preferring the most recently updated.
    pub fn find_by_ip(&self, ip: IpAddr) -> Option<String> {
        self.records
            .iter()
            .filter(|entry| entry.ip == Some(ip))
            .max_by_key(|entry| entry.last_update)
            .map(|entry| entry.device_id.clone())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }
}
