// Tick bodies of the poll tasks. Each fetches, updates shared state, then publishes.
// Every await precedes the publish, so a cancelled tick never publishes.

use super::Inner;
use super::poll::{PollKey, TickOutcome};
use super::status::Reconciliation;
use crate::events::Topic;
use crate::models::{LogLine, LogQuery, MonitorEvent, PollKind, TaskErrorInfo, now_millis};
use crate::runtime::{RuntimeError, with_timeout};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info, warn};

pub(super) async fn run_tick(inner: &Inner, key: &PollKey, log_cursor: &LogCursor) -> TickOutcome {
    match (key.kind, key.resource_id.as_deref()) {
        (PollKind::System, _) => system_tick(inner).await,
        (PollKind::Status, _) => status_tick(inner).await,
        (PollKind::Metrics, _) => metrics_tick(inner).await,
        (PollKind::Stats, Some(id)) => stats_tick(inner, id).await,
        (PollKind::Logs, Some(id)) => logs_tick(inner, id, log_cursor).await,
        (kind, None) => {
            warn!(task = %kind, "per-container poll task has no container id");
            TickOutcome::Terminate
        }
    }
}

async fn system_tick(inner: &Inner) -> TickOutcome {
    match inner.system_metrics().await {
        Ok(snapshot) => {
            inner
                .hub
                .publish(&Topic::SystemMetrics, &MonitorEvent::system_metrics(snapshot));
        }
        Err(e) => {
            warn!(error = %e, operation = "system_metrics", "system poll failed");
            report_failure(inner, PollKind::System, None, e.to_string(), false);
        }
    }
    TickOutcome::Continue
}

async fn status_tick(inner: &Inner) -> TickOutcome {
    let listing = with_timeout(inner.settings.fetch_timeout, inner.runtime.list_resources()).await;
    match listing {
        Ok(listing) => {
            let Reconciliation {
                transitions,
                forgotten,
            } = inner.tracker.reconcile(&listing);
            for t in transitions {
                debug!(resource_id = %t.id, previous = %t.previous, current = %t.current, "status changed");
                let topics = [Topic::ContainerStatus, Topic::Container(t.id.clone())];
                inner
                    .hub
                    .publish_to(&topics, &MonitorEvent::status_changed(t));
            }
            for id in &forgotten {
                inner.cache.remove(id);
                debug!(resource_id = %id, "container vanished from listing");
            }
            inner.cache.purge_expired();
        }
        Err(e) => {
            warn!(error = %e, operation = "list_resources", "status poll failed");
            report_failure(inner, PollKind::Status, None, e.to_string(), false);
        }
    }
    TickOutcome::Continue
}

async fn metrics_tick(inner: &Inner) -> TickOutcome {
    match inner.collect_resource_metrics().await {
        Ok((all, failed)) => {
            for (id, snapshot) in all {
                inner.hub.publish(
                    &Topic::ContainerMetrics,
                    &MonitorEvent::container_metrics(&id, snapshot),
                );
            }
            for (id, e) in failed {
                warn!(resource_id = %id, error = %e, "container metrics failed during collection");
                report_failure(inner, PollKind::Metrics, Some(&id), e.to_string(), false);
            }
        }
        Err(e) => {
            warn!(error = %e, operation = "collect_resource_metrics", "metrics poll failed");
            report_failure(inner, PollKind::Metrics, None, e.to_string(), false);
        }
    }
    TickOutcome::Continue
}

async fn stats_tick(inner: &Inner, id: &str) -> TickOutcome {
    let fetched =
        with_timeout(inner.settings.fetch_timeout, inner.runtime.resource_stats(id)).await;
    match fetched {
        Ok(snapshot) => {
            inner.cache.put(id, snapshot.clone());
            inner.hub.publish(
                &Topic::Container(id.to_string()),
                &MonitorEvent::container_metrics(id, snapshot),
            );
            TickOutcome::Continue
        }
        Err(e) => resource_failure(inner, PollKind::Stats, id, e).await,
    }
}

/// Where a log stream stands: the newest timestamp sent and how many lines carrying exactly
/// that timestamp were sent. Lines without a timestamp take the one of the line before them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) struct LogPosition {
    newest: u64,
    sent_at_newest: usize,
}

/// Per-task log position; unset until the first tick completes.
#[derive(Default)]
pub(super) struct LogCursor(Mutex<Option<LogPosition>>);

impl LogCursor {
    fn get(&self) -> Option<LogPosition> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, position: LogPosition) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(position);
    }
}

/// First tick sends the configured tail; later ticks send only lines not sent before.
async fn logs_tick(inner: &Inner, id: &str, cursor: &LogCursor) -> TickOutcome {
    let started = now_millis();
    let position = cursor.get();
    // The runtime filters by whole seconds, so the window reopens at the second of `newest`.
    let (query, floor) = match position {
        None => (
            LogQuery {
                tail: Some(inner.settings.log_tail),
                since: None,
            },
            0,
        ),
        Some(p) => (
            LogQuery {
                tail: None,
                since: Some(p.newest / 1000),
            },
            p.newest / 1000 * 1000,
        ),
    };

    let fetched = with_timeout(
        inner.settings.fetch_timeout,
        inner.runtime.historical_logs(id, &query),
    )
    .await;
    match fetched {
        Ok(lines) => {
            let (fresh, next) = unsent_lines(position, lines, floor, started);
            cursor.set(next);
            if !fresh.is_empty() {
                inner.hub.publish(
                    &Topic::ContainerLogs(id.to_string()),
                    &MonitorEvent::container_logs(id, fresh),
                );
            }
            TickOutcome::Continue
        }
        Err(e) => resource_failure(inner, PollKind::Logs, id, e).await,
    }
}

/// Splits a chronological batch into the lines not yet sent and the position after sending
/// them. `floor` stands in for the timestamp of leading lines that have none; `now` is the
/// position of a stream whose first batch was empty.
fn unsent_lines(
    position: Option<LogPosition>,
    batch: Vec<LogLine>,
    floor: u64,
    now: u64,
) -> (Vec<LogLine>, LogPosition) {
    let mut carry = floor;
    let mut skip = position.map_or(0, |p| p.sent_at_newest);
    let mut stamps = Vec::with_capacity(batch.len());
    let mut fresh = Vec::new();
    for line in batch {
        if line.timestamp != 0 {
            carry = line.timestamp;
        }
        stamps.push(carry);
        let unsent = match position {
            None => true,
            Some(p) if carry > p.newest => true,
            Some(p) if carry == p.newest && skip > 0 => {
                skip -= 1;
                false
            }
            Some(p) => carry == p.newest,
        };
        if unsent {
            fresh.push(line);
        }
    }

    let previous = match position {
        Some(p) => p,
        None if stamps.is_empty() => LogPosition {
            newest: now,
            sent_at_newest: 0,
        },
        None => LogPosition {
            newest: 0,
            sent_at_newest: 0,
        },
    };
    let newest = stamps.iter().copied().fold(previous.newest, u64::max);
    let mut sent_at_newest = stamps.iter().filter(|&&t| t == newest).count();
    if newest == previous.newest {
        sent_at_newest = sent_at_newest.max(previous.sent_at_newest);
    }
    (
        fresh,
        LogPosition {
            newest,
            sent_at_newest,
        },
    )
}

/// Re-checks existence after a per-container failure: gone means terminal, anything else
/// (including a failed listing) is transient and the task keeps its interval.
async fn resource_failure(
    inner: &Inner,
    kind: PollKind,
    id: &str,
    error: RuntimeError,
) -> TickOutcome {
    let listing = with_timeout(inner.settings.fetch_timeout, inner.runtime.list_resources()).await;
    let terminal = match listing {
        Ok(listing) => !listing.iter().any(|r| r.id == id),
        Err(e) => {
            debug!(resource_id = %id, error = %e, "existence check failed");
            false
        }
    };

    report_failure(inner, kind, Some(id), error.to_string(), terminal);
    if terminal {
        inner.tracker.forget(id);
        inner.cache.remove(id);
        info!(resource_id = %id, task = %kind, error = %error, "container is gone; stopping poll task");
        TickOutcome::Terminate
    } else {
        warn!(resource_id = %id, task = %kind, error = %error, "poll tick failed; retrying next interval");
        TickOutcome::Continue
    }
}

fn report_failure(
    inner: &Inner,
    task: PollKind,
    id: Option<&str>,
    message: String,
    terminal: bool,
) {
    let event = MonitorEvent::task_error(
        id,
        TaskErrorInfo {
            task,
            message,
            terminal,
        },
    );
    let mut topics = vec![Topic::Errors];
    if let Some(id) = id {
        topics.push(match task {
            PollKind::Logs => Topic::ContainerLogs(id.to_string()),
            _ => Topic::Container(id.to_string()),
        });
    }
    inner.hub.publish_to(&topics, &event);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogStream;

    fn line(timestamp: u64, message: &str) -> LogLine {
        LogLine {
            timestamp,
            stream: LogStream::Stdout,
            message: message.into(),
        }
    }

    fn messages(lines: &[LogLine]) -> Vec<&str> {
        lines.iter().map(|l| l.message.as_str()).collect()
    }

    #[test]
    fn first_batch_is_sent_whole() {
        let (fresh, position) = unsent_lines(None, vec![line(1_000, "a"), line(1_000, "b")], 0, 9);
        assert_eq!(messages(&fresh), ["a", "b"]);
        assert_eq!(
            position,
            LogPosition {
                newest: 1_000,
                sent_at_newest: 2
            }
        );
    }

    #[test]
    fn empty_first_batch_starts_from_now() {
        let (fresh, position) = unsent_lines(None, Vec::new(), 0, 7_500);
        assert!(fresh.is_empty());
        assert_eq!(position.newest, 7_500);
        assert_eq!(position.sent_at_newest, 0);
    }

    #[test]
    fn untimestamped_lines_follow_the_line_before_them() {
        let (fresh, position) = unsent_lines(
            None,
            vec![line(2_000, "panic: boom"), line(0, "  at main.rs:3")],
            0,
            0,
        );
        assert_eq!(fresh.len(), 2);
        assert_eq!(position.sent_at_newest, 2);

        let batch = vec![
            line(2_000, "panic: boom"),
            line(0, "  at main.rs:3"),
            line(0, "  at lib.rs:9"),
        ];
        let (fresh, position) = unsent_lines(Some(position), batch, 2_000, 0);
        assert_eq!(messages(&fresh), ["  at lib.rs:9"]);
        assert_eq!(position.sent_at_newest, 3);
    }

    #[test]
    fn older_lines_in_the_window_are_skipped() {
        let position = LogPosition {
            newest: 4_500,
            sent_at_newest: 1,
        };
        let batch = vec![line(4_100, "old"), line(4_500, "sent"), line(4_900, "new")];
        let (fresh, position) = unsent_lines(Some(position), batch, 4_000, 0);
        assert_eq!(messages(&fresh), ["new"]);
        assert_eq!(position.newest, 4_900);
        assert_eq!(position.sent_at_newest, 1);
    }
}
