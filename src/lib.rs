pub mod actors;
pub mod agent;
#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod error;
pub mod identity;
pub mod network;
pub mod protocol;
pub mod registry;
pub mod sensors;
pub mod util;

pub use error::{MonitorError, MonitorResult};
pub use protocol::{Announcement, PollResponse, StatusReport};
pub use registry::{DeviceRecord, DeviceRegistry, DeviceUpdate, RegistryEvent, Source};
