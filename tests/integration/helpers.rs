//! Helper functions for integration tests

#![allow(dead_code)]

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pda_monitor::{
    DeviceRecord, DeviceRegistry, MonitorResult, StatusReport,
    actors::{
        listener::{PayloadLimits, StatusListener},
        poller::{PollerHandle, StatusPoller},
        presence::PresenceListener,
        scanner::{ScannerHandle, ScannerOptions},
    },
    config::{PollConfig, ScanConfig},
    network::{HostProbe, LocalSubnet},
    sensors::{BatteryReading, SensorSource, StorageReading},
};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

pub const GB: u64 = 1024 * 1024 * 1024;

/// Status and presence listeners on ephemeral localhost ports
pub struct TestCollector {
    pub registry: DeviceRegistry,
    pub status_addr: SocketAddr,
    pub presence_addr: SocketAddr,
    pub cancel: CancellationToken,
}

impl TestCollector {
    pub async fn start() -> Self {
        Self::start_with_limits(PayloadLimits::default()).await
    }

    pub async fn start_with_limits(limits: PayloadLimits) -> Self {
        let registry = DeviceRegistry::new();
        let cancel = CancellationToken::new();

        let listener = StatusListener::bind(localhost(), registry.clone(), limits)
            .await
            .unwrap();
        let status_addr = listener.local_addr().unwrap();
        tokio::spawn(listener.run(cancel.child_token()));

        let presence = PresenceListener::bind(localhost(), registry.clone())
            .await
            .unwrap();
        let presence_addr = presence.local_addr().unwrap();
        tokio::spawn(presence.run(cancel.child_token()));

        Self {
            registry,
            status_addr,
            presence_addr,
            cancel,
        }
    }

    /// Wait until the record for `device_id` satisfies `ready`.
    pub async fn wait_for<F>(&self, device_id: &str, ready: F) -> DeviceRecord
    where
        F: Fn(&DeviceRecord) -> bool,
    {
        wait_for_record(&self.registry, device_id, ready).await
    }
}

impl Drop for TestCollector {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

pub fn localhost() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}

pub async fn wait_for_record<F>(registry: &DeviceRegistry, device_id: &str, ready: F) -> DeviceRecord
where
    F: Fn(&DeviceRecord) -> bool,
{
    for _ in 0..100 {
        if let Some(record) = registry.get(device_id)
            && ready(&record)
        {
            return record;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    panic!(
        "record {device_id} never became ready, last state: {:?}",
        registry.get(device_id)
    );
}

/// Open a connection, write `payload` and close it, like an agent does.
pub async fn push_raw(addr: SocketAddr, payload: &[u8]) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(payload).await.unwrap();
    stream.shutdown().await.unwrap();
}

pub fn sample_report(device_id: &str) -> StatusReport {
    StatusReport {
        device_id: device_id.to_string(),
        battery_percent: 57,
        is_charging: true,
        battery_health: String::from("good"),
        storage_info: String::from("Total: 29.8GB, Used: 12.1GB, Free: 17.7GB"),
        timestamp: String::from("2024-05-01 10:00:00"),
    }
}

/// Sensors returning fixed readings
#[derive(Debug, Clone, Copy)]
pub struct FixedSensors {
    pub percent: u8,
    pub is_charging: bool,
}

impl Default for FixedSensors {
    fn default() -> Self {
        Self {
            percent: 57,
            is_charging: true,
        }
    }
}

impl SensorSource for FixedSensors {
    fn battery(&self) -> MonitorResult<BatteryReading> {
        Ok(BatteryReading {
            percent: self.percent,
            is_charging: self.is_charging,
            health: String::from("good"),
        })
    }

    fn storage(&self) -> MonitorResult<StorageReading> {
        Ok(StorageReading {
            total_bytes: 32 * GB,
            used_bytes: 12 * GB,
            free_bytes: 20 * GB,
        })
    }
}

/// Probe that reports a fixed set of live hosts
pub struct FixedProbe(pub Vec<Ipv4Addr>);

#[async_trait]
impl HostProbe for FixedProbe {
    async fn discover(&self, _subnet: &LocalSubnet) -> MonitorResult<Vec<Ipv4Addr>> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// A scanner sweeping 127.0.0.0/24 on demand only, checking `ports`.
pub fn spawn_test_scanner(
    registry: &DeviceRegistry,
    live: Vec<Ipv4Addr>,
    ports: Vec<u16>,
) -> (ScannerHandle, PollerHandle) {
    let poller = PollerHandle::spawn(
        StatusPoller::http(registry.clone(), &PollConfig::default()).unwrap(),
    );

    let scan = ScanConfig {
        enabled: false,
        ports,
        port_timeout_ms: 300,
        ..ScanConfig::default()
    };
    let options = ScannerOptions::new(scan, "Zebra").with_subnet(
        LocalSubnet::from_prefix(Ipv4Addr::new(127, 0, 0, 200), 24, None).unwrap(),
    );

    let scanner = ScannerHandle::spawn(
        options,
        registry.clone(),
        Arc::new(FixedProbe(live)),
        poller.clone(),
    );

    (scanner, poller)
}

pub fn mock_port(uri: &str) -> u16 {
    url::Url::parse(uri).unwrap().port().unwrap()
}
