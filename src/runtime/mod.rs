// Container runtime boundary. The monitor only reaches the runtime through `RuntimeClient`.

mod docker;
mod stats;

pub use docker::DockerRuntime;

use crate::models::{LogLine, LogQuery, ResourceId, ResourceSummary, StatsSnapshot};
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    #[error("container {0} not found")]
    NotFound(ResourceId),
    #[error("runtime request timed out")]
    Timeout,
    #[error("runtime error: {0}")]
    Api(String),
}

/// Calls into the container runtime. Every call may fail or block; callers bound them with
/// [`with_timeout`].
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// All containers, running or not.
    async fn list_resources(&self) -> Result<Vec<ResourceSummary>, RuntimeError>;

    /// One fresh stats sample. Fails with `NotFound` for an unknown id.
    async fn resource_stats(&self, id: &str) -> Result<StatsSnapshot, RuntimeError>;

    async fn historical_logs(
        &self,
        id: &str,
        query: &LogQuery,
    ) -> Result<Vec<LogLine>, RuntimeError>;
}

/// Runs a runtime call with a deadline; an elapsed deadline is `RuntimeError::Timeout`.
pub async fn with_timeout<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, RuntimeError>>,
) -> Result<T, RuntimeError> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(RuntimeError::Timeout))
}
