use crate::monitoring::MonitorSettings;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub publishing: PublishingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub cache_ttl_ms: u64,
    pub system_interval_ms: u64,
    pub status_interval_ms: u64,
    /// All-container metrics while collection runs.
    pub metrics_interval_ms: u64,
    /// Per-container stats while a live stream is open.
    pub stream_interval_ms: u64,
    pub log_interval_ms: u64,
    /// Lines sent when a log stream opens, and the default for log queries.
    pub log_tail: usize,
    pub fetch_timeout_ms: u64,
    /// Start the system, status and metrics tasks at boot instead of waiting for
    /// `POST /api/monitoring/start`.
    pub collect_on_startup: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 10_000,
            system_interval_ms: 5_000,
            status_interval_ms: 5_000,
            metrics_interval_ms: 10_000,
            stream_interval_ms: 2_000,
            log_interval_ms: 2_000,
            log_tail: 100,
            fetch_timeout_ms: 15_000,
            collect_on_startup: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishingConfig {
    /// Events buffered per subscriber; slow subscribers lose events beyond this.
    pub subscriber_buffer: usize,
    /// How often to log app stats (tasks, subscribers, cache) at INFO level.
    pub stats_log_interval_secs: u64,
}

impl Default for PublishingConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: 256,
            stats_log_interval_secs: 60,
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        let m = &self.monitoring;
        MonitorSettings {
            cache_ttl: Duration::from_millis(m.cache_ttl_ms),
            system_interval: Duration::from_millis(m.system_interval_ms),
            status_interval: Duration::from_millis(m.status_interval_ms),
            metrics_interval: Duration::from_millis(m.metrics_interval_ms),
            stream_interval: Duration::from_millis(m.stream_interval_ms),
            log_interval: Duration::from_millis(m.log_interval_ms),
            log_tail: m.log_tail,
            fetch_timeout: Duration::from_millis(m.fetch_timeout_ms),
            stream_buffer: self.publishing.subscriber_buffer,
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(!self.server.host.is_empty(), "server.host must be non-empty");

        let m = &self.monitoring;
        for (name, value) in [
            ("cache_ttl_ms", m.cache_ttl_ms),
            ("system_interval_ms", m.system_interval_ms),
            ("status_interval_ms", m.status_interval_ms),
            ("metrics_interval_ms", m.metrics_interval_ms),
            ("stream_interval_ms", m.stream_interval_ms),
            ("log_interval_ms", m.log_interval_ms),
            ("fetch_timeout_ms", m.fetch_timeout_ms),
        ] {
            anyhow::ensure!(value > 0, "monitoring.{name} must be > 0, got {value}");
        }
        anyhow::ensure!(
            m.log_tail > 0,
            "monitoring.log_tail must be > 0, got {}",
            m.log_tail
        );

        anyhow::ensure!(
            self.publishing.subscriber_buffer > 0,
            "publishing.subscriber_buffer must be > 0, got {}",
            self.publishing.subscriber_buffer
        );
        anyhow::ensure!(
            self.publishing.stats_log_interval_secs > 0,
            "publishing.stats_log_interval_secs must be > 0, got {}",
            self.publishing.stats_log_interval_secs
        );
        Ok(())
    }
}
