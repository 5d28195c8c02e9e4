//! Agent loops delivering to a live collector

use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use pda_monitor::{
    Source,
    agent::{PresenceBroadcaster, StatusReporter, spawn_agent},
    config::AgentConfig,
};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use crate::helpers::*;

fn agent_config(collector: &TestCollector) -> AgentConfig {
    AgentConfig {
        collector_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
        status_port: collector.status_addr.port(),
        broadcast_port: collector.presence_addr.port(),
        broadcast_addr: Ipv4Addr::LOCALHOST,
        status_http: None,
        ..AgentConfig::default()
    }
}

#[tokio::test]
async fn test_reporter_push_is_merged() {
    let collector = TestCollector::start().await;
    let reporter = StatusReporter::new(
        "Zebra-0a0b0c0d0e0f",
        &agent_config(&collector),
        Arc::new(FixedSensors::default()),
    );

    let sent = reporter.report_once().await.unwrap();
    let record = collector
        .wait_for("Zebra-0a0b0c0d0e0f", |record| record.battery_percent.is_some())
        .await;

    assert_eq!(record.battery_percent, Some(sent.battery_percent));
    assert_eq!(record.is_charging, Some(true));
    assert_eq!(
        record.storage_summary.as_deref(),
        Some("Total: 32.0GB, Used: 12.0GB, Free: 20.0GB")
    );
    assert_eq!(record.source, Source::Push);
}

#[tokio::test]
async fn test_broadcast_creates_record_with_sender_ip() {
    let collector = TestCollector::start().await;
    let broadcaster = PresenceBroadcaster::new("Zebra-0a0b0c0d0e0f", &agent_config(&collector));

    let socket = PresenceBroadcaster::open_socket().await.unwrap();
    broadcaster.announce(&socket).await.unwrap();

    let record = collector.wait_for("Zebra-0a0b0c0d0e0f", |_| true).await;
    assert_eq!(record.ip, Some(IpAddr::V4(Ipv4Addr::LOCALHOST)));
    assert_eq!(record.source, Source::Broadcast);
    assert_eq!(record.battery_percent, None);
}

#[tokio::test]
async fn test_agent_loops_feed_one_record_until_cancelled() {
    let collector = TestCollector::start().await;
    let cancel = CancellationToken::new();

    let tasks = spawn_agent(
        "Zebra-agent",
        &agent_config(&collector),
        Arc::new(FixedSensors {
            percent: 81,
            is_charging: false,
        }),
        &cancel,
    );

    let record = collector
        .wait_for("Zebra-agent", |record| {
            record.battery_percent == Some(81) && record.ip.is_some()
        })
        .await;
    assert_eq!(record.is_charging, Some(false));
    assert_eq!(collector.registry.len(), 1);

    cancel.cancel();
    let failed = tokio::time::timeout(Duration::from_secs(2), tasks.join())
        .await
        .unwrap();
    assert_eq!(failed, 0);
}

#[tokio::test]
async fn test_reporter_keeps_running_while_collector_is_down() {
    let unreachable = {
        let listener = tokio::net::TcpListener::bind(localhost()).await.unwrap();
        listener.local_addr().unwrap()
    };

    let reporter = StatusReporter::new(
        "Zebra-offline",
        &AgentConfig::default(),
        Arc::new(FixedSensors::default()),
    )
    .with_collector(unreachable)
    .with_interval(Duration::from_millis(50), Duration::from_millis(20));

    let cancel = CancellationToken::new();
    let task = tokio::spawn(reporter.run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(!task.is_finished());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .unwrap()
        .unwrap();
}
