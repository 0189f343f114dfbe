// Host-wide snapshot models

use serde::{Deserialize, Serialize};

use super::percent_of;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuUsage {
    pub usage_percent: f64,
    pub core_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryTotals {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub percent: f64,
}

impl MemoryTotals {
    pub fn from_total_and_free(total_bytes: u64, free_bytes: u64) -> Self {
        let used_bytes = total_bytes.saturating_sub(free_bytes);
        Self {
            total_bytes,
            used_bytes,
            free_bytes,
            percent: percent_of(used_bytes, total_bytes),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiskUsage {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    pub percent: f64,
}

impl DiskUsage {
    pub fn from_total_and_free(total_bytes: u64, free_bytes: u64) -> Self {
        let used_bytes = total_bytes.saturating_sub(free_bytes);
        Self {
            total_bytes,
            used_bytes,
            free_bytes,
            percent: percent_of(used_bytes, total_bytes),
        }
    }
}

/// `stopped` counts every listed container that is not running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerCounts {
    pub total: u32,
    pub running: u32,
    pub stopped: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSnapshot {
    pub cpu: CpuUsage,
    pub memory: MemoryTotals,
    pub disk: DiskUsage,
    pub containers: ContainerCounts,
    pub captured_at: u64,
}
