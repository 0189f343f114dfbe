// RuntimeClient over the Docker Engine API via bollard

use super::stats::process_statistics;
use super::{RuntimeClient, RuntimeError};
use crate::models::{
    LifecycleStatus, LogLine, LogQuery, LogStream, ResourceSummary, StatsSnapshot, now_millis,
};
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::query_parameters::{ListContainersOptions, LogsOptions, StatsOptions};
use futures_util::StreamExt;
use tracing::instrument;

pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    pub fn connect() -> anyhow::Result<Self> {
        let docker = Docker::connect_with_unix_defaults()?;
        Ok(Self { docker })
    }
}

fn map_err(id: Option<&str>, e: bollard::errors::Error) -> RuntimeError {
    match (id, e) {
        (
            Some(id),
            bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            },
        ) => RuntimeError::NotFound(id.to_string()),
        (_, e) => RuntimeError::Api(e.to_string()),
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    #[instrument(skip(self), fields(runtime = "docker", operation = "list_resources"))]
    async fn list_resources(&self) -> Result<Vec<ResourceSummary>, RuntimeError> {
        let options = ListContainersOptions {
            all: true,
            ..Default::default()
        };
        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| map_err(None, e))?;

        Ok(containers
            .into_iter()
            .filter_map(|c| {
                let id = c.id?;
                let name = c
                    .names
                    .as_ref()
                    .and_then(|n| n.first())
                    .map(|n| n.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| id.clone());
                let status = c
                    .state
                    .as_ref()
                    .map(|s| LifecycleStatus::from_docker(&s.to_string()))
                    .unwrap_or(LifecycleStatus::Unknown);
                Some(ResourceSummary {
                    id,
                    name,
                    image: c.image.unwrap_or_default(),
                    status,
                })
            })
            .collect())
    }

    #[instrument(skip(self), fields(runtime = "docker", operation = "resource_stats"))]
    async fn resource_stats(&self, id: &str) -> Result<StatsSnapshot, RuntimeError> {
        let options = StatsOptions {
            stream: false,
            ..Default::default()
        };
        let mut stream = self.docker.stats(id, Some(options));
        match stream.next().await {
            Some(Ok(raw)) => process_statistics(&raw, now_millis()).ok_or_else(|| {
                RuntimeError::Api(format!("container {id} returned an empty stats sample"))
            }),
            Some(Err(e)) => Err(map_err(Some(id), e)),
            None => Err(RuntimeError::Api(format!(
                "stats stream for container {id} ended without a sample"
            ))),
        }
    }

    #[instrument(skip(self), fields(runtime = "docker", operation = "historical_logs"))]
    async fn historical_logs(
        &self,
        id: &str,
        query: &LogQuery,
    ) -> Result<Vec<LogLine>, RuntimeError> {
        let options = LogsOptions {
            stdout: true,
            stderr: true,
            timestamps: true,
            since: query
                .since
                .map(|s| s.min(i32::MAX as u64) as i32)
                .unwrap_or(0),
            tail: query
                .tail
                .map(|t| t.to_string())
                .unwrap_or_else(|| "all".into()),
            ..Default::default()
        };
        let mut stream = self.docker.logs(id, Some(options));
        let mut lines = Vec::new();
        while let Some(frame) = stream.next().await {
            let (stream_kind, message) = match frame.map_err(|e| map_err(Some(id), e))? {
                LogOutput::StdErr { message } => (LogStream::Stderr, message),
                LogOutput::StdOut { message } | LogOutput::Console { message } => {
                    (LogStream::Stdout, message)
                }
                LogOutput::StdIn { .. } => continue,
            };
            let text = String::from_utf8_lossy(&message);
            for raw in text.lines().filter(|l| !l.is_empty()) {
                lines.push(parse_log_line(raw, stream_kind));
            }
        }
        Ok(lines)
    }
}

/// Splits a `timestamps=true` frame ("2024-05-01T10:00:00.123456789Z message") into a LogLine.
pub(crate) fn parse_log_line(raw: &str, stream: LogStream) -> LogLine {
    if let Some((ts, message)) = raw.split_once(' ')
        && let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(ts)
    {
        return LogLine {
            timestamp: parsed.timestamp_millis().max(0) as u64,
            stream,
            message: message.to_string(),
        };
    }
    LogLine {
        timestamp: 0,
        stream,
        message: raw.to_string(),
    }
}
