//! Sweep, classification and enrichment against mocked devices

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use pda_monitor::{DeviceUpdate, Source};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

const LOCAL: Ipv4Addr = Ipv4Addr::LOCALHOST;

#[tokio::test]
async fn test_scanned_device_is_enriched_from_status_endpoint() {
    let device = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "battery": 42,
            "storage": "Total: 14.9GB, Used: 3.2GB, Free: 11.7GB"
        })))
        .mount(&device)
        .await;

    let registry = pda_monitor::DeviceRegistry::new();
    let (scanner, poller) = spawn_test_scanner(&registry, vec![LOCAL], vec![mock_port(&device.uri())]);

    let report = scanner.scan_now().await.unwrap();
    assert_eq!(report.devices.len(), 1);
    assert_eq!(report.devices[0].port, mock_port(&device.uri()));

    let record = wait_for_record(&registry, "Zebra-127-0-0-1", |record| {
        record.source == Source::Poll
    })
    .await;

    assert_eq!(record.ip, Some(IpAddr::V4(LOCAL)));
    assert_eq!(record.battery_percent, Some(42));
    assert_eq!(
        record.storage_summary.as_deref(),
        Some("Total: 14.9GB, Used: 3.2GB, Free: 11.7GB")
    );

    scanner.shutdown().await.unwrap();
    poller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failed_enrichment_keeps_scan_record() {
    let device = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&device)
        .await;

    let registry = pda_monitor::DeviceRegistry::new();
    let (scanner, poller) = spawn_test_scanner(&registry, vec![LOCAL], vec![mock_port(&device.uri())]);

    scanner.scan_now().await.unwrap();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let record = registry.get("Zebra-127-0-0-1").unwrap();
    assert_eq!(record.source, Source::Scan);
    assert_eq!(record.battery_percent, None);
    assert_eq!(record.storage_summary, None);

    scanner.shutdown().await.unwrap();
    poller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_scan_of_pushing_agent_updates_same_record() {
    let device = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"battery": "35%"})))
        .mount(&device)
        .await;

    let registry = pda_monitor::DeviceRegistry::new();
    registry.merge(
        DeviceUpdate::new("Zebra-aa11bb22", Source::Push)
            .ip(IpAddr::V4(LOCAL))
            .battery_percent(57)
            .battery_health("good"),
    );

    let (scanner, poller) = spawn_test_scanner(&registry, vec![LOCAL], vec![mock_port(&device.uri())]);
    let report = scanner.scan_now().await.unwrap();
    assert_eq!(report.devices[0].device_id, "Zebra-aa11bb22");

    let record = wait_for_record(&registry, "Zebra-aa11bb22", |record| {
        record.battery_percent == Some(35)
    })
    .await;

    assert_eq!(registry.len(), 1);
    assert_eq!(record.battery_health.as_deref(), Some("good"));

    scanner.shutdown().await.unwrap();
    poller.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_host_without_candidate_port_is_skipped() {
    let closed = {
        let listener = tokio::net::TcpListener::bind(localhost()).await.unwrap();
        listener.local_addr().unwrap().port()
    };

    let registry = pda_monitor::DeviceRegistry::new();
    let (scanner, poller) = spawn_test_scanner(&registry, vec![LOCAL], vec![closed]);

    let report = scanner.scan_now().await.unwrap();
    assert_eq!(report.live_hosts, 1);
    assert_eq!(report.errors, 0);
    assert!(registry.is_empty());

    scanner.shutdown().await.unwrap();
    poller.shutdown().await.unwrap();
}
