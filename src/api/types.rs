//! API response types

use serde::{Deserialize, Serialize};

use crate::registry::DeviceRecord;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,

    /// Number of devices currently in the registry
    pub devices: usize,

    /// Whether the scanner sweeps on its own timer
    pub scanning: bool,
}

/// Body of `GET /api/v1/devices`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DevicesResponse {
    pub devices: Vec<DeviceRecord>,
    pub count: usize,
}

impl From<Vec<DeviceRecord>> for DevicesResponse {
    fn from(devices: Vec<DeviceRecord>) -> Self {
        Self {
            count: devices.len(),
            devices,
        }
    }
}
