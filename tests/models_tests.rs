// Model serialization tests (JSON camelCase, event wire shape)

mod common;

use common::snapshot;
use dockwatch::events::Topic;
use dockwatch::models::*;

#[test]
fn test_stats_snapshot_serialization_camel_case() {
    let snap = StatsSnapshot {
        cpu_percent: 1.5,
        memory: MemoryUsage::new(1_000, 4_000),
        network: NetworkIo {
            rx_bytes: 10,
            tx_bytes: 20,
            rx_packets: 1,
            tx_packets: 2,
        },
        disk: DiskIo {
            read_bytes: 3,
            write_bytes: 4,
            read_ops: 0,
            write_ops: 0,
        },
        captured_at: 7,
    };
    let json = serde_json::to_string(&snap).unwrap();
    assert!(json.contains("\"cpuPercent\""));
    assert!(json.contains("\"usageBytes\""));
    assert!(json.contains("\"rxBytes\""));
    assert!(json.contains("\"capturedAt\""));
    let back: StatsSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snap);
}

#[test]
fn test_container_metrics_event_shape() {
    let mut snap = snapshot(3.0);
    snap.captured_at = 99;
    let event = MonitorEvent::container_metrics("abc", snap);
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "container-metrics");
    assert_eq!(json["resourceId"], "abc");
    assert_eq!(json["capturedAt"], 99);
    assert_eq!(json["data"]["cpuPercent"], 3.0);
    assert_eq!(event.kind(), EventKind::ContainerMetrics);
}

#[test]
fn test_system_event_has_no_resource_id() {
    let snap = SystemSnapshot {
        cpu: CpuUsage {
            usage_percent: 10.0,
            core_count: 4,
        },
        memory: MemoryTotals::from_total_and_free(100, 40),
        disk: DiskUsage::default(),
        containers: ContainerCounts::default(),
        captured_at: 5,
    };
    let json = serde_json::to_value(MonitorEvent::system_metrics(snap)).unwrap();
    assert_eq!(json["type"], "system-metrics");
    assert!(json.get("resourceId").is_none());
    assert_eq!(json["data"]["memory"]["usedBytes"], 60);
}

#[test]
fn test_status_change_event_shape() {
    let event = MonitorEvent::status_changed(StatusTransition {
        id: "c1".into(),
        previous: LifecycleStatus::Running,
        current: LifecycleStatus::Exited,
    });
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "container-status-changed");
    assert_eq!(json["resourceId"], "c1");
    assert_eq!(json["data"]["previous"], "running");
    assert_eq!(json["data"]["current"], "exited");
}

#[test]
fn test_task_error_terminal_matching() {
    let info = TaskErrorInfo {
        task: PollKind::Stats,
        message: "container c1 not found".into(),
        terminal: true,
    };
    let event = MonitorEvent::task_error(Some("c1"), info.clone());
    assert!(event.is_terminal_for(PollKind::Stats, "c1"));
    assert!(!event.is_terminal_for(PollKind::Logs, "c1"));
    assert!(!event.is_terminal_for(PollKind::Stats, "c2"));

    let transient = MonitorEvent::task_error(
        Some("c1"),
        TaskErrorInfo {
            terminal: false,
            ..info
        },
    );
    assert!(!transient.is_terminal_for(PollKind::Stats, "c1"));

    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "task-error");
    assert_eq!(json["data"]["task"], "stats");
    assert_eq!(json["data"]["terminal"], true);
}

#[test]
fn test_log_event_carries_lines() {
    let event = MonitorEvent::container_logs(
        "c1",
        vec![LogLine {
            timestamp: 1,
            stream: LogStream::Stderr,
            message: "boom".into(),
        }],
    );
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "container-logs");
    assert_eq!(json["data"][0]["stream"], "stderr");
    assert_eq!(json["data"][0]["message"], "boom");
}

#[test]
fn test_resource_summary_json_roundtrip() {
    let json = r#"{"id":"a","name":"web","image":"nginx","status":"restarting"}"#;
    let summary: ResourceSummary = serde_json::from_str(json).unwrap();
    assert_eq!(summary.status, LifecycleStatus::Restarting);
    assert!(!summary.status.is_running());
    let back = serde_json::to_string(&summary).unwrap();
    assert_eq!(back, json);
}

#[test]
fn test_topics_serialize_as_keys() {
    let topics = vec![
        Topic::Global,
        Topic::ContainerStatus,
        Topic::ContainerLogs("c1".into()),
    ];
    let json = serde_json::to_string(&topics).unwrap();
    assert_eq!(json, r#"["global","containers:status","container:c1:logs"]"#);
    let back: Vec<Topic> = serde_json::from_str(&json).unwrap();
    assert_eq!(back, topics);
}
