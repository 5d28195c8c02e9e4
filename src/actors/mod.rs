//! Collector-side actors
//!
//! Every producer runs as an independent tokio task and writes into the shared
//! [`DeviceRegistry`](crate::registry::DeviceRegistry).
//!
//! ```text
//!   agents ──push──▶ StatusListener ──┐
//!   agents ──udp───▶ PresenceListener ─┤
//!                                      ├──▶ DeviceRegistry ──events──▶ presentation
//!   subnet ◀─sweep── NetworkScanner ───┤
//!                        │ enrich      │
//!                        ▼             │
//!                   StatusPoller ──────┘
//! ```
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: the scanner and poller each own an mpsc command channel
//!    wrapped by a cloneable handle
//! 2. **Request/Response**: oneshot channels for `scan_now` / `enrich_now`
//! 3. **Cancellation**: the two listeners stop when their `CancellationToken` fires

pub mod listener;
pub mod messages;
pub mod poller;
pub mod presence;
pub mod scanner;
