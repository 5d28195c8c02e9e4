//! Subnet discovery and host classification used by the NetworkScanner
//!
//! - **subnet**: which network to sweep, derived from the local interface
//! - **probe**: which hosts on it are alive (external `nmap` or a plain sweep)
//! - **classify**: whether a live host looks like a managed device

pub mod classify;
pub mod probe;
pub mod subnet;

pub use classify::{Candidate, classify_host};
pub use probe::{HostProbe, NmapProbe, SweepProbe, probe_for};
pub use subnet::{LocalSubnet, network_address};
