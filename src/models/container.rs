// Container listing, lifecycle status, per-container stats and log models

use serde::{Deserialize, Serialize};
use std::fmt;

use super::percent_of;

/// Runtime-provided container identifier.
pub type ResourceId = String;

/// Container lifecycle status; serializes to lowercase JSON (e.g. "running").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Created,
    Running,
    Paused,
    Restarting,
    Stopped,
    Exited,
    #[serde(other)]
    Unknown,
}

impl LifecycleStatus {
    /// Parse from the Docker API state string (e.g. "running", "exited").
    /// `removing` and `dead` have no counterpart here and count as stopped.
    pub fn from_docker(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "created" => LifecycleStatus::Created,
            "running" => LifecycleStatus::Running,
            "paused" => LifecycleStatus::Paused,
            "restarting" => LifecycleStatus::Restarting,
            "exited" => LifecycleStatus::Exited,
            "stopped" | "removing" | "dead" => LifecycleStatus::Stopped,
            _ => LifecycleStatus::Unknown,
        }
    }

    pub fn is_running(self) -> bool {
        self == LifecycleStatus::Running
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleStatus::Created => "created",
            LifecycleStatus::Running => "running",
            LifecycleStatus::Paused => "paused",
            LifecycleStatus::Restarting => "restarting",
            LifecycleStatus::Stopped => "stopped",
            LifecycleStatus::Exited => "exited",
            LifecycleStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for LifecycleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the runtime's container listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSummary {
    pub id: ResourceId,
    pub name: String,
    #[serde(default)]
    pub image: String,
    pub status: LifecycleStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub usage_bytes: u64,
    pub limit_bytes: u64,
    pub percent: f64,
}

impl MemoryUsage {
    pub fn new(usage_bytes: u64, limit_bytes: u64) -> Self {
        Self {
            usage_bytes,
            limit_bytes,
            percent: percent_of(usage_bytes, limit_bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkIo {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
    pub rx_packets: u64,
    pub tx_packets: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskIo {
    pub read_bytes: u64,
    pub write_bytes: u64,
    pub read_ops: u64,
    pub write_ops: u64,
}

/// Point-in-time resource usage of one container. A new poll yields a new snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub cpu_percent: f64,
    pub memory: MemoryUsage,
    pub network: NetworkIo,
    pub disk: DiskIo,
    /// Milliseconds since the Unix epoch.
    pub captured_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    /// Milliseconds since the Unix epoch; 0 when the runtime sent no timestamp.
    pub timestamp: u64,
    pub stream: LogStream,
    pub message: String,
}

/// Historical log window: the last `tail` lines and/or lines since a Unix time in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct LogQuery {
    pub tail: Option<usize>,
    pub since: Option<u64>,
}
