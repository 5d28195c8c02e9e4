//! StatusReporter - pushes a status document to the collector on a fixed schedule
//!
//! Every report uses a fresh connection: connect, write the whole document,
//! close the write side. Nothing is read back.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace, warn};

use crate::config::AgentConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::protocol::StatusReport;
use crate::sensors::SensorSource;
use crate::util::wire_timestamp;

pub struct StatusReporter {
    device_id: String,
    collector: SocketAddr,
    interval: Duration,
    retry_backoff: Duration,
    connect_timeout: Duration,
    sensors: Arc<dyn SensorSource>,
}

impl StatusReporter {
    pub fn new(
        device_id: impl Into<String>,
        config: &AgentConfig,
        sensors: Arc<dyn SensorSource>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            collector: config.collector_endpoint(),
            interval: Duration::from_secs(config.report_interval),
            retry_backoff: Duration::from_secs(config.retry_backoff),
            connect_timeout: Duration::from_secs(config.connect_timeout),
            sensors,
        }
    }

    pub fn with_collector(mut self, collector: SocketAddr) -> Self {
        self.collector = collector;
        self
    }

    pub fn with_interval(mut self, interval: Duration, retry_backoff: Duration) -> Self {
        self.interval = interval;
        self.retry_backoff = retry_backoff;
        self
    }

    /// Read the sensors and build the document for this device.
    pub async fn collect(&self) -> MonitorResult<StatusReport> {
        let sensors = Arc::clone(&self.sensors);

        let (battery, storage) = tokio::task::spawn_blocking(move || {
            Ok::<_, MonitorError>((sensors.battery()?, sensors.storage()?))
        })
        .await
        .map_err(|e| MonitorError::Sensor(format!("sensor task failed: {e}")))??;

        Ok(StatusReport {
            device_id: self.device_id.clone(),
            battery_percent: battery.percent.min(100),
            is_charging: battery.is_charging,
            battery_health: battery.health,
            storage_info: storage.summary(),
            timestamp: wire_timestamp(),
        })
    }

    /// Connect, send one document and close.
    #[instrument(skip(self), fields(device_id = %self.device_id, collector = %self.collector))]
    pub async fn report_once(&self) -> MonitorResult<StatusReport> {
        let report = self.collect().await?;
        let payload = report.encode()?;

        let mut stream = timeout(self.connect_timeout, TcpStream::connect(self.collector)).await??;
        stream.write_all(&payload).await?;
        stream.shutdown().await?;

        trace!("pushed {} bytes", payload.len());
        Ok(report)
    }

    /// Report every interval until cancelled; failures wait the retry backoff.
    #[instrument(skip_all, fields(device_id = %self.device_id))]
    pub async fn run(self, cancel: CancellationToken) {
        info!("reporting status to {} every {:?}", self.collector, self.interval);

        loop {
            let delay = match self.report_once().await {
                Ok(report) => {
                    debug!("reported battery {}%", report.battery_percent);
                    self.interval
                }
                Err(e) => {
                    warn!("status report failed: {:#}", e);
                    self.retry_backoff
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("status reporter cancelled");
                    break;
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
