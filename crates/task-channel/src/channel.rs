//! The task channel contract and its in-memory implementation.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::TaskId;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::task::{Task, TaskResult};

/// Tunables for task delivery.
#[derive(Debug, Clone, Copy)]
pub struct ChannelConfig {
    /// How long a polled task may remain unacknowledged before it is
    /// considered lost and redelivered.
    pub lease: Duration,

    /// How many times a task may be delivered before the channel gives up
    /// and synthesizes a failed result for it.
    pub max_deliveries: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            lease: Duration::from_secs(5),
            max_deliveries: 3,
        }
    }
}

/// Counts reported by [`TaskChannel::reclaim_expired`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReclaimSummary {
    /// Tasks whose lease expired and were re-enqueued.
    pub redelivered: usize,

    /// Tasks that exhausted their delivery budget and were converted into
    /// synthetic failed results.
    pub exhausted: usize,
}

/// Contract between the coordinator, the workers, and the queue backend.
///
/// FIFO within a task kind; no ordering guarantee across kinds. Delivery
/// is at-least-once, so handlers must be idempotent on the business key.
#[async_trait]
pub trait TaskChannel: Send + Sync {
    /// Appends a task to the tail of its kind's queue.
    async fn enqueue(&self, task: Task);

    /// Removes and returns the head task of the kind's queue, waiting up
    /// to `timeout`. Returns `None` if no task arrived in time — not an
    /// error. The returned task holds a lease until acknowledged via
    /// [`report`](TaskChannel::report).
    async fn poll(&self, task_kind: &str, timeout: Duration) -> Option<Task>;

    /// Acknowledges a consumed task and queues its result for the
    /// coordinator.
    async fn report(&self, result: TaskResult);

    /// Removes and returns the next task result, waiting up to `timeout`.
    async fn next_result(&self, timeout: Duration) -> Option<TaskResult>;

    /// Sweeps the in-flight table: re-enqueues lease-expired tasks and
    /// converts tasks out of delivery budget into failed results.
    async fn reclaim_expired(&self) -> ReclaimSummary;
}

#[derive(Debug)]
struct QueuedTask {
    task: Task,
    deliveries: u32,
}

#[derive(Debug)]
struct InFlight {
    task: Task,
    expires_at: Instant,
    deliveries: u32,
}

#[derive(Debug, Default)]
struct ChannelState {
    queues: HashMap<String, VecDeque<QueuedTask>>,
    in_flight: HashMap<TaskId, InFlight>,
    results: VecDeque<TaskResult>,
}

#[derive(Debug)]
struct Inner {
    config: ChannelConfig,
    state: Mutex<ChannelState>,
    task_ready: Notify,
    result_ready: Notify,
}

/// In-memory task channel used by the default wiring and the tests.
///
/// State lives behind one async mutex; pollers park on [`Notify`] so an
/// empty poll costs nothing until a task (or result) shows up.
#[derive(Debug, Clone)]
pub struct InMemoryTaskChannel {
    inner: Arc<Inner>,
}

impl Default for InMemoryTaskChannel {
    fn default() -> Self {
        Self::new(ChannelConfig::default())
    }
}

impl InMemoryTaskChannel {
    /// Creates a channel with the given delivery tunables.
    pub fn new(config: ChannelConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(ChannelState::default()),
                task_ready: Notify::new(),
                result_ready: Notify::new(),
            }),
        }
    }

    /// Returns how many tasks are queued (not in flight) for a kind.
    pub async fn queued_count(&self, task_kind: &str) -> usize {
        let state = self.inner.state.lock().await;
        state.queues.get(task_kind).map_or(0, VecDeque::len)
    }

    /// Returns how many tasks currently hold a lease.
    pub async fn in_flight_count(&self) -> usize {
        let state = self.inner.state.lock().await;
        state.in_flight.len()
    }

    async fn reclaim_now(&self) -> ReclaimSummary {
        let now = Instant::now();
        let mut summary = ReclaimSummary::default();

        let mut state = self.inner.state.lock().await;
        let expired: Vec<TaskId> = state
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(id, _)| *id)
            .collect();

        for task_id in expired {
            let Some(entry) = state.in_flight.remove(&task_id) else {
                continue;
            };
            if entry.deliveries >= self.inner.config.max_deliveries {
                tracing::warn!(
                    %task_id,
                    kind = %entry.task.task_kind,
                    deliveries = entry.deliveries,
                    "task exhausted its delivery budget"
                );
                metrics::counter!("channel_tasks_exhausted_total").increment(1);
                state.results.push_back(TaskResult::failed(
                    task_id,
                    format!("no result after {} deliveries; lease expired", entry.deliveries),
                ));
                summary.exhausted += 1;
            } else {
                tracing::debug!(%task_id, kind = %entry.task.task_kind, "lease expired, redelivering");
                metrics::counter!("channel_redeliveries_total").increment(1);
                state
                    .queues
                    .entry(entry.task.task_kind.clone())
                    .or_default()
                    .push_back(QueuedTask {
                        task: entry.task,
                        deliveries: entry.deliveries,
                    });
                summary.redelivered += 1;
            }
        }
        drop(state);

        if summary.redelivered > 0 {
            self.inner.task_ready.notify_waiters();
        }
        if summary.exhausted > 0 {
            self.inner.result_ready.notify_waiters();
        }
        summary
    }
}

#[async_trait]
impl TaskChannel for InMemoryTaskChannel {
    async fn enqueue(&self, task: Task) {
        tracing::debug!(task_id = %task.task_id, kind = %task.task_kind, "task enqueued");
        metrics::counter!("channel_tasks_enqueued_total").increment(1);

        let mut state = self.inner.state.lock().await;
        state
            .queues
            .entry(task.task_kind.clone())
            .or_default()
            .push_back(QueuedTask { task, deliveries: 0 });
        drop(state);

        self.inner.task_ready.notify_waiters();
    }

    async fn poll(&self, task_kind: &str, timeout: Duration) -> Option<Task> {
        let deadline = Instant::now() + timeout;
        loop {
            self.reclaim_now().await;

            // Register for wakeups before checking the queue so an enqueue
            // between the check and the wait is not lost.
            let notified = self.inner.task_ready.notified();
            {
                let mut state = self.inner.state.lock().await;
                if let Some(queued) = state.queues.get_mut(task_kind).and_then(VecDeque::pop_front)
                {
                    let deliveries = queued.deliveries + 1;
                    let task = queued.task.clone();
                    state.in_flight.insert(
                        task.task_id,
                        InFlight {
                            task: queued.task,
                            expires_at: Instant::now() + self.inner.config.lease,
                            deliveries,
                        },
                    );
                    return Some(task);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                return None;
            }
        }
    }

    async fn report(&self, result: TaskResult) {
        tracing::debug!(task_id = %result.task_id, status = %result.status, "task result reported");

        let mut state = self.inner.state.lock().await;
        state.in_flight.remove(&result.task_id);
        state.results.push_back(result);
        drop(state);

        self.inner.result_ready.notify_waiters();
    }

    async fn next_result(&self, timeout: Duration) -> Option<TaskResult> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.inner.result_ready.notified();
            {
                let mut state = self.inner.state.lock().await;
                if let Some(result) = state.results.pop_front() {
                    return Some(result);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            if tokio::time::timeout(deadline - now, notified).await.is_err() {
                return None;
            }
        }
    }

    async fn reclaim_expired(&self) -> ReclaimSummary {
        self.reclaim_now().await
    }
}
