use anyhow::Result;
use dockwatch::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let runtime = Arc::new(runtime::DockerRuntime::connect()?);
    let host = Arc::new(host::SysinfoHost::new());
    let disks = Arc::new(host::SysinfoDisks::new());
    let monitor = monitoring::Monitor::new(runtime, host, disks, app_config.monitor_settings());

    if app_config.monitoring.collect_on_startup {
        monitor.start_collection();
    }

    let ws_connections = Arc::new(AtomicUsize::new(0));
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let stats_handle = spawn_stats_logger(
        monitor.clone(),
        ws_connections.clone(),
        Duration::from_secs(app_config.publishing.stats_log_interval_secs),
        shutdown_rx,
    );

    let app = routes::app(monitor.clone(), ws_connections);
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Received shutdown signal");
    let _ = shutdown_tx.send(());
    let _ = stats_handle.await;
    monitor.shutdown().await;
    Ok(())
}

/// Logs task, subscriber and cache counters every `every` until shutdown.
fn spawn_stats_logger(
    monitor: monitoring::Monitor,
    ws_connections: Arc<AtomicUsize>,
    every: Duration,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut stats_log_tick = interval(every);
        stats_log_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // First tick fires immediately; nothing to report yet.
        stats_log_tick.tick().await;
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => break,
                _ = stats_log_tick.tick() => {
                    let stats = monitor.stats();
                    tracing::info!(
                        ws_clients = ws_connections.load(Ordering::Relaxed),
                        active_tasks = stats.active_tasks.len(),
                        subscribers = stats.subscribers,
                        cached_snapshots = stats.cached_snapshots,
                        tracked_containers = stats.tracked_resources,
                        delivery_failures = stats.delivery_failures,
                        "app stats"
                    );
                }
            }
        }
    })
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(s) => s,
                Err(_) => {
                    let _ = tokio::signal::ctrl_c().await;
                    return;
                }
            };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
