// Errors surfaced by the monitoring facade

use crate::models::{LifecycleStatus, ResourceId};
use crate::runtime::RuntimeError;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Fetch failed and nothing fresh was cached.
    #[error("metrics for container {id} are unavailable: {source}")]
    ResourceUnavailable {
        id: ResourceId,
        #[source]
        source: RuntimeError,
    },
    #[error("container {0} does not exist")]
    ResourceNotFound(ResourceId),
    #[error("container {id} is {status}, not running")]
    ResourceNotRunning {
        id: ResourceId,
        status: LifecycleStatus,
    },
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("host metrics unavailable: {0}")]
    Host(String),
}

impl MonitorError {
    /// True when the failure means the container does not exist at all.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            MonitorError::ResourceNotFound(_)
                | MonitorError::ResourceUnavailable {
                    source: RuntimeError::NotFound(_),
                    ..
                }
                | MonitorError::Runtime(RuntimeError::NotFound(_))
        )
    }
}
