// Config loading and validation tests

use dockwatch::config::AppConfig;
use std::time::Duration;

const VALID_CONFIG: &str = r#"
[server]
port = 8081
host = "0.0.0.0"

[monitoring]
cache_ttl_ms = 5000
system_interval_ms = 1000
status_interval_ms = 2000
metrics_interval_ms = 3000
stream_interval_ms = 500
log_interval_ms = 750
log_tail = 50
fetch_timeout_ms = 4000
collect_on_startup = false

[publishing]
subscriber_buffer = 32
stats_log_interval_secs = 60
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.monitoring.cache_ttl_ms, 5000);
    assert_eq!(config.monitoring.log_tail, 50);
    assert!(!config.monitoring.collect_on_startup);
    assert_eq!(config.publishing.subscriber_buffer, 32);
}

#[test]
fn test_config_defaults_when_sections_omitted() {
    let config = AppConfig::load_from_str(
        r#"
[server]
port = 9000
host = "127.0.0.1"
"#,
    )
    .expect("valid");
    assert_eq!(config.monitoring.cache_ttl_ms, 10_000);
    assert_eq!(config.monitoring.stream_interval_ms, 2_000);
    assert_eq!(config.monitoring.log_tail, 100);
    assert!(config.monitoring.collect_on_startup);
    assert_eq!(config.publishing.subscriber_buffer, 256);
    assert_eq!(config.publishing.stats_log_interval_secs, 60);
}

#[test]
fn test_config_partial_section_keeps_other_defaults() {
    let config = AppConfig::load_from_str(
        r#"
[server]
port = 9000
host = "127.0.0.1"

[monitoring]
log_tail = 7
"#,
    )
    .expect("valid");
    assert_eq!(config.monitoring.log_tail, 7);
    assert_eq!(config.monitoring.fetch_timeout_ms, 15_000);
}

#[test]
fn test_monitor_settings_follow_config() {
    let settings = AppConfig::load_from_str(VALID_CONFIG)
        .unwrap()
        .monitor_settings();
    assert_eq!(settings.cache_ttl, Duration::from_secs(5));
    assert_eq!(settings.system_interval, Duration::from_secs(1));
    assert_eq!(settings.status_interval, Duration::from_secs(2));
    assert_eq!(settings.metrics_interval, Duration::from_secs(3));
    assert_eq!(settings.stream_interval, Duration::from_millis(500));
    assert_eq!(settings.log_interval, Duration::from_millis(750));
    assert_eq!(settings.log_tail, 50);
    assert_eq!(settings.fetch_timeout, Duration::from_secs(4));
    assert_eq!(settings.stream_buffer, 32);
}

#[test]
fn test_config_validation_rejects_invalid_port() {
    let bad = VALID_CONFIG.replace("port = 8081", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_config_validation_rejects_empty_host() {
    let bad = VALID_CONFIG.replace("host = \"0.0.0.0\"", "host = \"\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.host"));
}

#[test]
fn test_config_validation_rejects_zero_intervals() {
    for field in [
        "cache_ttl_ms = 5000",
        "system_interval_ms = 1000",
        "status_interval_ms = 2000",
        "metrics_interval_ms = 3000",
        "stream_interval_ms = 500",
        "log_interval_ms = 750",
        "fetch_timeout_ms = 4000",
    ] {
        let name = field.split(' ').next().unwrap();
        let bad = VALID_CONFIG.replace(field, &format!("{name} = 0"));
        let err = AppConfig::load_from_str(&bad).unwrap_err();
        assert!(
            err.to_string().contains(&format!("monitoring.{name}")),
            "{name}: {err}"
        );
    }
}

#[test]
fn test_config_validation_rejects_log_tail_zero() {
    let bad = VALID_CONFIG.replace("log_tail = 50", "log_tail = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("log_tail"));
}

#[test]
fn test_config_validation_rejects_subscriber_buffer_zero() {
    let bad = VALID_CONFIG.replace("subscriber_buffer = 32", "subscriber_buffer = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("subscriber_buffer"));
}

#[test]
fn test_config_validation_rejects_stats_log_interval_zero() {
    let bad = VALID_CONFIG.replace(
        "stats_log_interval_secs = 60",
        "stats_log_interval_secs = 0",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("stats_log_interval_secs"));
}

#[test]
fn test_config_validation_rejects_invalid_toml() {
    let err = AppConfig::load_from_str("not valid toml [[[").unwrap_err();
    assert!(!err.to_string().is_empty());
}

#[test]
fn test_config_load_from_file_via_env() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, VALID_CONFIG).unwrap();
    unsafe { std::env::set_var("CONFIG_FILE", path.to_str().unwrap()) };
    let result = AppConfig::load();
    unsafe { std::env::remove_var("CONFIG_FILE") };
    let config = result.expect("load from CONFIG_FILE");
    assert_eq!(config.server.port, 8081);
    assert_eq!(config.monitoring.metrics_interval_ms, 3000);
}
