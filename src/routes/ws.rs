// WebSocket handlers: topic subscriptions and per-container streams

use axum::{
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{Duration, Instant, MissedTickBehavior, timeout};

use super::AppState;
use super::http::ApiError;
use crate::error::MonitorError;
use crate::events::Topic;
use crate::monitoring::EventStream;

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// Decrements the WebSocket connection count on drop (connect = +1, drop = -1).
struct WsGuard(Arc<AtomicUsize>);

impl WsGuard {
    fn enter(count: Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::Relaxed);
        Self(count)
    }
}

impl Drop for WsGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct EventsParams {
    /// Comma-separated topic keys, e.g. `system:metrics,container:abc`.
    topics: Option<String>,
}

/// Client → server frames on a subscription socket.
#[derive(Debug, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
enum ClientCommand {
    Subscribe { topics: Vec<String> },
    Unsubscribe { topics: Vec<String> },
}

fn parse_topics<'a>(keys: impl IntoIterator<Item = &'a str>) -> Result<Vec<Topic>, String> {
    keys.into_iter()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(|k| Topic::from_str(k).map_err(|e| e.to_string()))
        .collect()
}

/// Sends one text frame; false means the client is gone or too slow.
async fn send_text(socket: &mut WebSocket, json: String) -> bool {
    let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
    matches!(r, Ok(Ok(())))
}

async fn send_error(socket: &mut WebSocket, message: &str, status: u16) -> bool {
    let frame = serde_json::json!({ "type": "error", "message": message, "status": status });
    send_text(socket, frame.to_string()).await
}

pub(super) async fn ws_events(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<EventsParams>,
) -> impl IntoResponse {
    let monitor = state.monitor.clone();
    let conn_count = state.ws_connections.clone();
    ws.on_upgrade(move |mut socket| async move {
        let _guard = WsGuard::enter(conn_count);
        let topics = match parse_topics(params.topics.as_deref().unwrap_or("").split(',')) {
            Ok(topics) => topics,
            Err(message) => {
                send_error(&mut socket, &message, 400).await;
                let _ = socket.send(Message::Close(None)).await;
                return;
            }
        };
        tracing::info!(topics = topics.len(), "Client connected to event stream");
        let stream = monitor.subscribe(topics);
        if let Err(e) = forward(socket, stream).await {
            tracing::info!("Event stream error: {}", e);
        }
    })
}

pub(super) async fn ws_container_stats(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let monitor = state.monitor.clone();
    let conn_count = state.ws_connections.clone();
    ws.on_upgrade(move |socket| async move {
        let _guard = WsGuard::enter(conn_count);
        let opened = monitor.stream_resource_stats(&id).await;
        serve_resource_stream(socket, opened, &id, "stats").await;
    })
}

pub(super) async fn ws_container_logs(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    let monitor = state.monitor.clone();
    let conn_count = state.ws_connections.clone();
    ws.on_upgrade(move |socket| async move {
        let _guard = WsGuard::enter(conn_count);
        let opened = monitor.stream_resource_logs(&id).await;
        serve_resource_stream(socket, opened, &id, "logs").await;
    })
}

async fn serve_resource_stream(
    mut socket: WebSocket,
    opened: Result<EventStream, MonitorError>,
    id: &str,
    kind: &str,
) {
    match opened {
        Ok(stream) => {
            tracing::info!(resource_id = %id, stream = kind, "Client connected to container stream");
            if let Err(e) = forward(socket, stream).await {
                tracing::info!(resource_id = %id, stream = kind, "Container stream error: {}", e);
            }
        }
        Err(e) => {
            let message = e.to_string();
            let status = ApiError(e).status().as_u16();
            tracing::debug!(resource_id = %id, stream = kind, status, "container stream rejected");
            send_error(&mut socket, &message, status).await;
            let _ = socket.send(Message::Close(None)).await;
        }
    }
}

/// Pushes events until the stream ends or the client leaves, answering subscribe commands and
/// pinging every [`WS_PING_INTERVAL`]. Closing the stream releases its poll task.
async fn forward(mut socket: WebSocket, mut stream: EventStream) -> anyhow::Result<()> {
    let mut ping_interval =
        tokio::time::interval_at(Instant::now() + WS_PING_INTERVAL, WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let result = loop {
        tokio::select! {
            event = stream.recv() => {
                let Some(event) = event else {
                    let _ = socket.send(Message::Close(None)).await;
                    break Ok(());
                };
                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(e) => break Err(e.into()),
                };
                if !send_text(&mut socket, json).await {
                    break Ok(());
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        if let Err(message) = apply_command(&stream, text.as_str())
                            && !send_error(&mut socket, &message, 400).await
                        {
                            break Ok(());
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break Ok(()),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => break Err(e.into()),
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if !matches!(r, Ok(Ok(()))) {
                    break Ok(());
                }
            }
        }
    };
    stream.close().await;
    result
}

fn apply_command(stream: &EventStream, text: &str) -> Result<(), String> {
    let command: ClientCommand =
        serde_json::from_str(text).map_err(|e| format!("invalid command: {e}"))?;
    match command {
        ClientCommand::Subscribe { topics } => {
            stream.subscribe(parse_topics(topics.iter().map(String::as_str))?);
        }
        ClientCommand::Unsubscribe { topics } => {
            stream.unsubscribe(parse_topics(topics.iter().map(String::as_str))?);
        }
    }
    Ok(())
}
