//! Concurrent merge behaviour of the device registry

use std::net::IpAddr;

use chrono::{Duration, Utc};
use pda_monitor::{DeviceRegistry, DeviceUpdate, RegistryEvent, Source};
use pretty_assertions::assert_eq;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_merges_for_one_device_keep_every_field() {
    let registry = DeviceRegistry::new();
    let ip: IpAddr = "192.168.1.50".parse().unwrap();

    let mut tasks = vec![];
    for round in 0..50u8 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let update = match round % 4 {
                0 => DeviceUpdate::new("Zebra-1", Source::Push).battery_percent(40),
                1 => DeviceUpdate::new("Zebra-1", Source::Poll).storage_summary("Total: 8.0GB"),
                2 => DeviceUpdate::new("Zebra-1", Source::Broadcast).ip(ip),
                _ => DeviceUpdate::new("Zebra-1", Source::Push)
                    .is_charging(true)
                    .battery_health("good"),
            };
            registry.merge(update);
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    let record = registry.get("Zebra-1").unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(record.battery_percent, Some(40));
    assert_eq!(record.storage_summary.as_deref(), Some("Total: 8.0GB"));
    assert_eq!(record.ip, Some(ip));
    assert_eq!(record.is_charging, Some(true));
    assert_eq!(record.battery_health.as_deref(), Some("good"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_devices_merge_independently() {
    let registry = DeviceRegistry::new();

    let mut tasks = vec![];
    for device in 0..100 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            for battery in 0..10u8 {
                registry.merge(
                    DeviceUpdate::new(format!("Zebra-{device:03}"), Source::Push)
                        .battery_percent(battery * 10),
                );
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 100);
    assert!(snapshot.iter().all(|record| record.battery_percent == Some(90)));
    assert_eq!(snapshot[0].device_id, "Zebra-000");
    assert_eq!(snapshot[99].device_id, "Zebra-099");
}

#[test]
fn test_late_update_does_not_move_last_update_back() {
    let registry = DeviceRegistry::new();
    let now = Utc::now();

    registry.merge(DeviceUpdate::new("Zebra-1", Source::Push).received_at(now));
    let record = registry.merge(
        DeviceUpdate::new("Zebra-1", Source::Poll)
            .received_at(now - Duration::seconds(30))
            .battery_percent(12),
    );

    assert_eq!(record.last_update, now);
    assert_eq!(record.battery_percent, Some(12));
    assert_eq!(record.source, Source::Poll);
}

#[tokio::test]
async fn test_subscribers_see_added_then_updated() {
    let registry = DeviceRegistry::new();
    let mut events = registry.subscribe();

    registry.merge(DeviceUpdate::new("Zebra-1", Source::Scan));
    registry.merge(DeviceUpdate::new("Zebra-1", Source::Poll).battery_percent(80));

    match events.recv().await.unwrap() {
        RegistryEvent::DeviceAdded(record) => assert_eq!(record.source, Source::Scan),
        other => panic!("expected DeviceAdded, got {other:?}"),
    }
    match events.recv().await.unwrap() {
        RegistryEvent::DeviceUpdated(record) => assert_eq!(record.battery_percent, Some(80)),
        other => panic!("expected DeviceUpdated, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_racing_first_merges_publish_added_first() {
    let ip: IpAddr = "192.168.1.51".parse().unwrap();

    for _ in 0..50 {
        let registry = DeviceRegistry::new();
        let mut events = registry.subscribe();

        let mut tasks = vec![];
        for field in 0..4u8 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let update = match field {
                    0 => DeviceUpdate::new("Zebra-new", Source::Push).battery_percent(40),
                    1 => DeviceUpdate::new("Zebra-new", Source::Poll).storage_summary("Total: 8.0GB"),
                    2 => DeviceUpdate::new("Zebra-new", Source::Broadcast).ip(ip),
                    _ => DeviceUpdate::new("Zebra-new", Source::Push).is_charging(true),
                };
                registry.merge(update);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let received: Vec<RegistryEvent> = (0..4).map(|_| events.try_recv().unwrap()).collect();

        assert!(matches!(received[0], RegistryEvent::DeviceAdded(_)));
        assert!(
            received[1..]
                .iter()
                .all(|event| matches!(event, RegistryEvent::DeviceUpdated(_)))
        );

        // each event carries every field merged before it
        let known_fields: Vec<usize> = received
            .iter()
            .map(|event| {
                let record = event.record();
                [
                    record.battery_percent.is_some(),
                    record.storage_summary.is_some(),
                    record.ip.is_some(),
                    record.is_charging.is_some(),
                ]
                .into_iter()
                .filter(|known| *known)
                .count()
            })
            .collect();
        assert_eq!(known_fields, vec![1, 2, 3, 4]);
    }
}

#[tokio::test]
async fn test_records_are_never_evicted() {
    let registry = DeviceRegistry::new();
    let stale = Utc::now() - Duration::days(7);

    registry.merge(
        DeviceUpdate::new("Zebra-old", Source::Broadcast)
            .received_at(stale)
            .ip("10.0.0.9".parse().unwrap()),
    );

    for device in 0..20 {
        registry.merge(DeviceUpdate::new(format!("Zebra-{device}"), Source::Push));
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let record = registry.get("Zebra-old").unwrap();
    assert_eq!(record.last_update, stale);
    assert_eq!(registry.len(), 21);
}
