//! Full push scenario and multi-source reconciliation

use std::net::{IpAddr, Ipv4Addr};

use chrono::Utc;
use pda_monitor::{Announcement, Source};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::net::UdpSocket;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::helpers::*;

#[tokio::test]
async fn test_pushed_status_appears_in_snapshot_verbatim() {
    let collector = TestCollector::start().await;
    let before_push = Utc::now();

    let payload = json!({
        "device_id": "Zebra-aa11bb22",
        "battery_percent": 57,
        "is_charging": true,
        "battery_health": "good",
        "storage_info": "Total: 29.8GB, Used: 12.1GB, Free: 17.7GB",
        "timestamp": "2024-05-01 10:00:00"
    });
    push_raw(collector.status_addr, payload.to_string().as_bytes()).await;

    collector.wait_for("Zebra-aa11bb22", |_| true).await;

    let snapshot = collector.registry.snapshot();
    assert_eq!(snapshot.len(), 1);

    let record = &snapshot[0];
    assert_eq!(record.device_id, "Zebra-aa11bb22");
    assert_eq!(record.battery_percent, Some(57));
    assert_eq!(record.is_charging, Some(true));
    assert_eq!(record.battery_health.as_deref(), Some("good"));
    assert_eq!(
        record.storage_summary.as_deref(),
        Some("Total: 29.8GB, Used: 12.1GB, Free: 17.7GB")
    );
    assert!(record.last_update >= before_push);
}

#[tokio::test]
async fn test_three_sources_reconcile_into_one_record() {
    let collector = TestCollector::start().await;
    let local = IpAddr::V4(Ipv4Addr::LOCALHOST);

    // presence first
    let socket = UdpSocket::bind(localhost()).await.unwrap();
    socket
        .send_to(
            &Announcement::new("Zebra-aa11bb22").encode().unwrap(),
            collector.presence_addr,
        )
        .await
        .unwrap();
    collector.wait_for("Zebra-aa11bb22", |record| record.ip == Some(local)).await;

    // then a push
    push_raw(
        collector.status_addr,
        &sample_report("Zebra-aa11bb22").encode().unwrap(),
    )
    .await;
    collector
        .wait_for("Zebra-aa11bb22", |record| record.source == Source::Push)
        .await;

    // then a sweep that finds the same address and polls it
    let device = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/status"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"battery": 56})))
        .mount(&device)
        .await;

    let (scanner, poller) = spawn_test_scanner(
        &collector.registry,
        vec![Ipv4Addr::LOCALHOST],
        vec![mock_port(&device.uri())],
    );
    scanner.scan_now().await.unwrap();

    let record = collector
        .wait_for("Zebra-aa11bb22", |record| record.source == Source::Poll)
        .await;

    assert_eq!(collector.registry.len(), 1);
    assert_eq!(record.battery_percent, Some(56));
    assert_eq!(record.is_charging, Some(true));
    assert_eq!(
        record.storage_summary.as_deref(),
        Some("Total: 29.8GB, Used: 12.1GB, Free: 17.7GB")
    );

    scanner.shutdown().await.unwrap();
    poller.shutdown().await.unwrap();
}
