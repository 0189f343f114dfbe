// Poll tasks and the registry that owns them.
//
// Each task is a tokio task with its own interval. The registry map is the single owner of
// task lifecycle: check-and-insert happens under one lock, so concurrent starts for a key
// spawn one task. Stop is cancel-then-drain: remove the key, cancel the token, await the task.

use crate::models::{PollKind, ResourceId};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PollKey {
    pub kind: PollKind,
    pub resource_id: Option<ResourceId>,
}

impl PollKey {
    pub fn system_wide(kind: PollKind) -> Self {
        Self {
            kind,
            resource_id: None,
        }
    }

    pub fn for_resource(kind: PollKind, id: &str) -> Self {
        Self {
            kind,
            resource_id: Some(id.to_string()),
        }
    }
}

impl fmt::Display for PollKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.resource_id {
            Some(id) => write!(f, "{}:{}", self.kind, id),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// What a tick tells its task to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// Unrecoverable failure: the task removes itself from the registry and exits.
    Terminate,
}

struct PollHandle {
    generation: u64,
    token: CancellationToken,
    join: JoinHandle<()>,
}

type TaskMap = Mutex<HashMap<PollKey, PollHandle>>;

#[derive(Default)]
pub struct PollRegistry {
    tasks: Arc<TaskMap>,
    next_generation: AtomicU64,
}

impl PollRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawns a task running `job` every `every` (first tick immediately). Returns false and
    /// does nothing if a live task is already registered under `key`.
    pub fn start<F, Fut>(&self, key: PollKey, every: Duration, job: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickOutcome> + Send + 'static,
    {
        let mut tasks = lock(&self.tasks);
        if tasks.get(&key).is_some_and(|h| !h.join.is_finished()) {
            debug!(task = %key, "poll task already running");
            return false;
        }
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let join = tokio::spawn(run_task(
            key.clone(),
            every,
            job,
            token.clone(),
            Arc::downgrade(&self.tasks),
            generation,
        ));
        debug!(task = %key, interval_ms = every.as_millis() as u64, "poll task started");
        tasks.insert(
            key,
            PollHandle {
                generation,
                token,
                join,
            },
        );
        true
    }

    /// Cancels and drains the task for `key`. When this returns no further tick of that task
    /// runs. Returns false if nothing was running.
    pub async fn stop(&self, key: &PollKey) -> bool {
        let removed = lock(&self.tasks).remove(key);
        let Some(handle) = removed else {
            return false;
        };
        let was_running = !handle.join.is_finished();
        drain(key, handle).await;
        debug!(task = %key, "poll task stopped");
        was_running
    }

    pub async fn stop_all(&self) -> usize {
        let handles: Vec<(PollKey, PollHandle)> = lock(&self.tasks).drain().collect();
        let n = handles.len();
        for (_, handle) in &handles {
            handle.token.cancel();
        }
        for (key, handle) in handles {
            drain(&key, handle).await;
        }
        n
    }

    pub fn is_running(&self, key: &PollKey) -> bool {
        lock(&self.tasks)
            .get(key)
            .is_some_and(|h| !h.join.is_finished())
    }

    pub fn active_keys(&self) -> Vec<PollKey> {
        lock(&self.tasks)
            .iter()
            .filter(|(_, h)| !h.join.is_finished())
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.active_keys().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn lock(tasks: &TaskMap) -> std::sync::MutexGuard<'_, HashMap<PollKey, PollHandle>> {
    tasks.lock().unwrap_or_else(PoisonError::into_inner)
}

async fn drain(key: &PollKey, handle: PollHandle) {
    handle.token.cancel();
    if let Err(e) = handle.join.await
        && e.is_panic()
    {
        warn!(task = %key, "poll task panicked");
    }
}

async fn run_task<F, Fut>(
    key: PollKey,
    every: Duration,
    mut job: F,
    token: CancellationToken,
    tasks: Weak<TaskMap>,
    generation: u64,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = TickOutcome> + Send + 'static,
{
    let mut tick = interval(every);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // Biased: once cancelled, no new tick starts and an in-flight fetch is abandoned.
        // Publishing happens after a job's last await, so it is never cut short.
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            outcome = async {
                tick.tick().await;
                job().await
            } => outcome,
        };

        if outcome == TickOutcome::Terminate {
            if let Some(tasks) = tasks.upgrade() {
                let mut tasks = lock(&tasks);
                if tasks.get(&key).is_some_and(|h| h.generation == generation) {
                    tasks.remove(&key);
                }
            }
            info!(task = %key, "poll task terminated itself");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counting_job(
        ticks: Arc<AtomicUsize>,
    ) -> impl FnMut() -> std::future::Ready<TickOutcome> + Send + 'static {
        move || {
            ticks.fetch_add(1, Ordering::SeqCst);
            std::future::ready(TickOutcome::Continue)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_starts_spawn_exactly_one_task() {
        let registry = Arc::new(PollRegistry::new());
        let ticks = Arc::new(AtomicUsize::new(0));
        let key = PollKey::for_resource(PollKind::Stats, "c1");

        let starters: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let ticks = ticks.clone();
                let key = key.clone();
                tokio::spawn(async move {
                    registry.start(key, Duration::from_secs(1), counting_job(ticks))
                })
            })
            .collect();
        let mut started = 0;
        for s in starters {
            if s.await.unwrap() {
                started += 1;
            }
        }
        assert_eq!(started, 1);
        assert_eq!(registry.len(), 1);

        // ticks at 0s, 1s, 2s, 3s
        tokio::time::sleep(Duration::from_millis(3_500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 4);
        assert!(registry.stop(&key).await);
    }

    #[tokio::test(start_paused = true)]
    async fn no_tick_runs_after_stop_returns() {
        let registry = PollRegistry::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let key = PollKey::system_wide(PollKind::System);
        registry.start(key.clone(), Duration::from_millis(100), counting_job(ticks.clone()));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert!(registry.stop(&key).await);
        let after_stop = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
        assert!(!registry.is_running(&key));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_abandons_a_hung_tick() {
        let registry = PollRegistry::new();
        let key = PollKey::for_resource(PollKind::Logs, "c1");
        registry.start(key.clone(), Duration::from_secs(1), || async {
            std::future::pending::<()>().await;
            TickOutcome::Continue
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(registry.stop(&key).await);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn stopping_an_unknown_task_is_a_noop() {
        let registry = PollRegistry::new();
        assert!(!registry.stop(&PollKey::system_wide(PollKind::Status)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn terminating_task_removes_itself_and_can_be_restarted() {
        let registry = PollRegistry::new();
        let key = PollKey::for_resource(PollKind::Stats, "gone");
        let ticks = Arc::new(AtomicUsize::new(0));
        let t = ticks.clone();
        registry.start(key.clone(), Duration::from_millis(100), move || {
            t.fetch_add(1, Ordering::SeqCst);
            std::future::ready(TickOutcome::Terminate)
        });

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 1);
        assert!(!registry.is_running(&key));
        assert!(registry.active_keys().is_empty());

        assert!(registry.start(key.clone(), Duration::from_millis(100), counting_job(ticks)));
        assert!(registry.is_running(&key));
        assert_eq!(registry.stop_all().await, 1);
    }

    #[test]
    fn keys_render_kind_and_resource() {
        assert_eq!(PollKey::system_wide(PollKind::Status).to_string(), "status");
        assert_eq!(
            PollKey::for_resource(PollKind::Stats, "abc").to_string(),
            "stats:abc"
        );
    }
}
