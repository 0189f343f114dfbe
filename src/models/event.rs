// Events published through the fan-out

use serde::{Deserialize, Serialize};

use super::{
    LifecycleStatus, LogLine, PollKind, ResourceId, StatsSnapshot, SystemSnapshot, now_millis,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    ContainerStatusChanged,
    ContainerMetrics,
    SystemMetrics,
    ContainerLogs,
    TaskError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTransition {
    pub id: ResourceId,
    pub previous: LifecycleStatus,
    pub current: LifecycleStatus,
}

/// A failed poll tick. `terminal` means the container is gone and the task stopped itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskErrorInfo {
    pub task: PollKind,
    pub message: String,
    pub terminal: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum EventPayload {
    ContainerStatusChanged(StatusTransition),
    ContainerMetrics(StatsSnapshot),
    SystemMetrics(SystemSnapshot),
    ContainerLogs(Vec<LogLine>),
    TaskError(TaskErrorInfo),
}

/// Wire shape: `{"type": "container-metrics", "data": {...}, "resourceId": "...", "capturedAt": 0}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<ResourceId>,
    #[serde(flatten)]
    pub payload: EventPayload,
    pub captured_at: u64,
}

impl MonitorEvent {
    pub fn status_changed(transition: StatusTransition) -> Self {
        Self {
            resource_id: Some(transition.id.clone()),
            payload: EventPayload::ContainerStatusChanged(transition),
            captured_at: now_millis(),
        }
    }

    pub fn container_metrics(id: &str, snapshot: StatsSnapshot) -> Self {
        Self {
            resource_id: Some(id.to_string()),
            captured_at: snapshot.captured_at,
            payload: EventPayload::ContainerMetrics(snapshot),
        }
    }

    pub fn system_metrics(snapshot: SystemSnapshot) -> Self {
        Self {
            resource_id: None,
            captured_at: snapshot.captured_at,
            payload: EventPayload::SystemMetrics(snapshot),
        }
    }

    pub fn container_logs(id: &str, lines: Vec<LogLine>) -> Self {
        Self {
            resource_id: Some(id.to_string()),
            payload: EventPayload::ContainerLogs(lines),
            captured_at: now_millis(),
        }
    }

    pub fn task_error(resource_id: Option<&str>, info: TaskErrorInfo) -> Self {
        Self {
            resource_id: resource_id.map(str::to_string),
            payload: EventPayload::TaskError(info),
            captured_at: now_millis(),
        }
    }

    pub fn kind(&self) -> EventKind {
        match self.payload {
            EventPayload::ContainerStatusChanged(_) => EventKind::ContainerStatusChanged,
            EventPayload::ContainerMetrics(_) => EventKind::ContainerMetrics,
            EventPayload::SystemMetrics(_) => EventKind::SystemMetrics,
            EventPayload::ContainerLogs(_) => EventKind::ContainerLogs,
            EventPayload::TaskError(_) => EventKind::TaskError,
        }
    }

    /// True for the error a per-resource task publishes right before stopping itself.
    pub fn is_terminal_for(&self, kind: PollKind, id: &str) -> bool {
        match &self.payload {
            EventPayload::TaskError(info) => {
                info.terminal && info.task == kind && self.resource_id.as_deref() == Some(id)
            }
            _ => false,
        }
    }
}
