//! Agent side: presence announcements, status pushes and the status endpoint
//!
//! The broadcaster and reporter are independent loops; a failure in one never
//! delays the other.

pub mod broadcaster;
pub mod reporter;
pub mod status;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::error;

pub use broadcaster::PresenceBroadcaster;
pub use reporter::StatusReporter;

use crate::config::AgentConfig;
use crate::sensors::SensorSource;

/// Handles to the two agent loops
pub struct AgentTasks {
    pub broadcaster: JoinHandle<()>,
    pub reporter: JoinHandle<()>,
}

impl AgentTasks {
    /// Wait for both loops to finish after their token was cancelled.
    ///
    /// Returns how many loops ended abnormally (panicked or were aborted).
    pub async fn join(self) -> usize {
        let (broadcaster, reporter) = tokio::join!(self.broadcaster, self.reporter);

        [("broadcaster", broadcaster), ("reporter", reporter)]
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|e| (name, e)))
            .inspect(|(name, e)| error!("{name} task ended abnormally: {e}"))
            .count()
    }
}

/// Spawn the broadcaster and reporter for `device_id`.
pub fn spawn_agent(
    device_id: &str,
    config: &AgentConfig,
    sensors: Arc<dyn SensorSource>,
    cancel: &CancellationToken,
) -> AgentTasks {
    let broadcaster = PresenceBroadcaster::new(device_id, config);
    let reporter = StatusReporter::new(device_id, config, sensors);

    AgentTasks {
        broadcaster: tokio::spawn(broadcaster.run(cancel.child_token())),
        reporter: tokio::spawn(reporter.run(cancel.child_token())),
    }
}
