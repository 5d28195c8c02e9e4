//! Device sensor readings consumed by the agent
//!
//! Battery reads are device-model specific and not available through a portable
//! API, so [`SystemSensors`] reports a fixed healthy battery. Storage comes from
//! the mounted disks.

use serde::{Deserialize, Serialize};
use sysinfo::Disks;

use crate::error::{MonitorError, MonitorResult};
use crate::protocol::format_storage_summary;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatteryReading {
    pub percent: u8,
    pub is_charging: bool,
    pub health: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageReading {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

impl StorageReading {
    /// Sum `(total, available)` byte pairs, one per disk. Sums saturate at `u64::MAX`.
    pub fn from_disks(disks: impl IntoIterator<Item = (u64, u64)>) -> Self {
        let (total, free) = disks
            .into_iter()
            .fold((0u64, 0u64), |(total, free), (disk_total, disk_free)| {
                (total.saturating_add(disk_total), free.saturating_add(disk_free))
            });

        Self {
            total_bytes: total,
            used_bytes: total.saturating_sub(free),
            free_bytes: free,
        }
    }

    pub fn summary(&self) -> String {
        format_storage_summary(self.total_bytes, self.used_bytes, self.free_bytes)
    }
}

/// Source of battery and storage readings
///
/// Implementations may block; callers run them on the blocking pool.
pub trait SensorSource: Send + Sync {
    fn battery(&self) -> MonitorResult<BatteryReading>;

    fn storage(&self) -> MonitorResult<StorageReading>;
}

/// Readings from the host the agent runs on
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemSensors;

impl SensorSource for SystemSensors {
    fn battery(&self) -> MonitorResult<BatteryReading> {
        Ok(BatteryReading {
            percent: 100,
            is_charging: false,
            health: String::from("good"),
        })
    }

    fn storage(&self) -> MonitorResult<StorageReading> {
        let disks = Disks::new_with_refreshed_list();

        if disks.list().is_empty() {
            return Err(MonitorError::Sensor(String::from("no disks reported")));
        }

        Ok(StorageReading::from_disks(
            disks
                .list()
                .iter()
                .map(|disk| (disk.total_space(), disk.available_space())),
        ))
    }
}
