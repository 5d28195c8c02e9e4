//! API shared state

use crate::actors::scanner::ScannerHandle;
use crate::registry::DeviceRegistry;

/// Shared state handed to every route
#[derive(Clone)]
pub struct ApiState {
    pub registry: DeviceRegistry,

    /// Serves on-demand sweeps even when periodic scanning is off
    pub scanner: ScannerHandle,

    /// Whether the scanner also sweeps on its own timer
    pub periodic_scan: bool,
}

impl ApiState {
    pub fn new(registry: DeviceRegistry, scanner: ScannerHandle, periodic_scan: bool) -> Self {
        Self {
            registry,
            scanner,
            periodic_scan,
        }
    }
}
