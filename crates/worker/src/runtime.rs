//! Polling runtime executing handlers against the task channel.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use task_channel::{Task, TaskChannel, TaskResult};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::handler::{HandlerOutcome, TaskHandler};

/// Polling knobs for one task kind.
#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    /// Pause between polls that returned no task.
    pub poll_interval: Duration,

    /// How long a single poll call blocks waiting for a task.
    pub poll_timeout: Duration,

    /// Number of concurrent pollers for this kind. Bounds concurrent side
    /// effects on the owning service's datastore; 1 to 5 is safe.
    pub concurrency: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            poll_timeout: Duration::from_millis(500),
            concurrency: 1,
        }
    }
}

struct WorkerSpec {
    task_kind: String,
    config: WorkerConfig,
    handler: Arc<dyn TaskHandler>,
}

/// Registration boundary for a service's handlers.
///
/// Collects `(task kind, config, handler)` triples and spawns the polling
/// loops when started. One `WorkerSet` per hosting process is typical,
/// covering all kinds the process owns.
#[derive(Default)]
pub struct WorkerSet {
    specs: Vec<WorkerSpec>,
}

impl WorkerSet {
    /// Creates an empty worker set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a task kind.
    pub fn register(
        &mut self,
        task_kind: impl Into<String>,
        config: WorkerConfig,
        handler: impl TaskHandler + 'static,
    ) -> &mut Self {
        self.specs.push(WorkerSpec {
            task_kind: task_kind.into(),
            config,
            handler: Arc::new(handler),
        });
        self
    }

    /// Returns the number of registered kinds.
    pub fn kind_count(&self) -> usize {
        self.specs.len()
    }

    /// Spawns the configured pollers against a channel.
    pub fn start<C>(self, channel: C) -> WorkerSetHandle
    where
        C: TaskChannel + Clone + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        for spec in self.specs {
            for slot in 0..spec.config.concurrency.max(1) {
                let channel = channel.clone();
                let task_kind = spec.task_kind.clone();
                let handler = Arc::clone(&spec.handler);
                let config = spec.config;
                let shutdown = shutdown_rx.clone();
                tasks.push(tokio::spawn(poll_loop(
                    channel, task_kind, config, handler, shutdown, slot,
                )));
            }
        }

        WorkerSetHandle { shutdown_tx, tasks }
    }
}

/// Handle over a started worker set; shuts the pollers down gracefully.
pub struct WorkerSetHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl WorkerSetHandle {
    /// Signals all pollers to stop and waits for them to drain their
    /// current task.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            let _ = task.await;
        }
    }
}

async fn poll_loop<C: TaskChannel>(
    channel: C,
    task_kind: String,
    config: WorkerConfig,
    handler: Arc<dyn TaskHandler>,
    mut shutdown: watch::Receiver<bool>,
    slot: usize,
) {
    tracing::debug!(kind = %task_kind, slot, "worker poller started");
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            polled = channel.poll(&task_kind, config.poll_timeout) => {
                match polled {
                    Some(task) => execute(&channel, handler.as_ref(), task).await,
                    None => tokio::time::sleep(config.poll_interval).await,
                }
            }
        }
    }
    tracing::debug!(kind = %task_kind, slot, "worker poller stopped");
}

/// Runs one handler invocation and reports exactly one result for it.
/// Handler errors and panics become failed results; the poller survives.
async fn execute<C: TaskChannel>(channel: &C, handler: &dyn TaskHandler, task: Task) {
    let task_id = task.task_id;
    let kind = task.task_kind;
    tracing::info!(kind = %kind, %task_id, "task received");
    metrics::counter!("worker_tasks_total").increment(1);

    let outcome = AssertUnwindSafe(handler.handle(task.input_data))
        .catch_unwind()
        .await;

    let result = match outcome {
        Ok(Ok(HandlerOutcome::Completed(output_data))) => {
            TaskResult::completed(task_id, output_data)
        }
        Ok(Ok(HandlerOutcome::NotApplicable)) => {
            tracing::info!(kind = %kind, %task_id, "nothing to do");
            TaskResult::not_applicable(task_id)
        }
        Ok(Err(error)) => {
            tracing::warn!(kind = %kind, %task_id, %error, "handler failed");
            metrics::counter!("worker_tasks_failed").increment(1);
            TaskResult::failed(task_id, error.to_string())
        }
        Err(_) => {
            tracing::error!(kind = %kind, %task_id, "handler panicked");
            metrics::counter!("worker_tasks_failed").increment(1);
            TaskResult::failed(task_id, "handler panicked")
        }
    };

    channel.report(result).await;
}
