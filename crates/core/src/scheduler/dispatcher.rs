use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};

use super::model::{WorkItem, WorkName};
use super::queue::WorkQueue;
use crate::errors::{Error, Result};
use crate::supervisor::FailureSupervisor;

/// Maximum wall time a single work item may run before it counts as failed.
pub const WORK_ITEM_TIMEOUT_SECS: u64 = 10 * 60;

/// Outcome reported by a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkResult {
    Success,
    /// Run again after the item's backoff.
    Retry,
    /// Give up on this item.
    Failure,
}

#[async_trait]
pub trait Worker: Send + Sync {
    async fn run(&self, item: &WorkItem) -> Result<WorkResult>;
}

/// Counts from one dispatch pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub succeeded: usize,
    pub retried: usize,
    pub failed: usize,
    pub escalated: usize,
}

/// Runs due work items through their registered workers.
pub struct WorkDispatcher {
    queue: Arc<dyn WorkQueue>,
    workers: HashMap<WorkName, Arc<dyn Worker>>,
    supervisor: Arc<FailureSupervisor>,
    item_timeout: StdDuration,
}

impl WorkDispatcher {
    pub fn new(queue: Arc<dyn WorkQueue>, supervisor: Arc<FailureSupervisor>) -> Self {
        Self {
            queue,
            workers: HashMap::new(),
            supervisor,
            item_timeout: StdDuration::from_secs(WORK_ITEM_TIMEOUT_SECS),
        }
    }

    pub fn register(&mut self, name: WorkName, worker: Arc<dyn Worker>) -> &mut Self {
        self.workers.insert(name, worker);
        self
    }

    pub fn with_item_timeout(mut self, timeout: StdDuration) -> Self {
        self.item_timeout = timeout;
        self
    }

    pub async fn run_due(&self, now: DateTime<Utc>) -> Result<DispatchReport> {
        let due = self.queue.list_due(now).await?;
        let mut report = DispatchReport::default();
        if due.is_empty() {
            return Ok(report);
        }
        debug!("[Scheduler] {} work item(s) due", due.len());

        for item in due {
            let Some(worker) = self.workers.get(&item.name) else {
                error!("[Scheduler] No worker registered for {}, dropping", item.name);
                self.queue.complete(item.name, &item.id).await?;
                report.failed += 1;
                continue;
            };

            let outcome = self.run_isolated(Arc::clone(worker), &item).await;

            match outcome {
                Ok(WorkResult::Success) => {
                    self.queue.complete(item.name, &item.id).await?;
                    report.succeeded += 1;
                }
                Ok(WorkResult::Retry) => {
                    self.retry(&item, now).await?;
                    report.retried += 1;
                }
                Ok(WorkResult::Failure) => {
                    info!("[Scheduler] {} failed, not retrying", item.name);
                    self.queue.complete(item.name, &item.id).await?;
                    report.failed += 1;
                }
                Err(err) if err.is_unrecoverable() => {
                    error!("[Scheduler] {} hit an unrecoverable error: {}", item.name, err);
                    self.queue.complete(item.name, &item.id).await?;
                    report.escalated += 1;
                    self.escalate(&err).await;
                }
                Err(err) => {
                    warn!("[Scheduler] {} failed: {}, retrying", item.name, err);
                    self.retry(&item, now).await?;
                    report.retried += 1;
                }
            }
        }

        Ok(report)
    }

    /// Runs one worker on its own task so a panic surfaces as an error
    /// instead of unwinding through the dispatch loop.
    async fn run_isolated(&self, worker: Arc<dyn Worker>, item: &WorkItem) -> Result<WorkResult> {
        let task_item = item.clone();
        let mut handle = tokio::spawn(async move { worker.run(&task_item).await });
        match tokio::time::timeout(self.item_timeout, &mut handle).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(join_err)) if join_err.is_panic() => Err(Error::invalid_state(format!(
                "worker for {} panicked",
                item.name
            ))),
            Ok(Err(_)) => {
                warn!("[Scheduler] {} was cancelled", item.name);
                Ok(WorkResult::Retry)
            }
            Err(_) => {
                handle.abort();
                warn!("[Scheduler] {} timed out", item.name);
                Ok(WorkResult::Retry)
            }
        }
    }

    async fn retry(&self, item: &WorkItem, now: DateTime<Utc>) -> Result<()> {
        let attempts = item.attempts.saturating_add(1);
        let run_at = now + item.backoff.delay_for(attempts);
        debug!(
            "[Scheduler] Retrying {} (attempt {}) at {}",
            item.name,
            attempts,
            run_at.to_rfc3339()
        );
        self.queue
            .retry(item.name, &item.id, run_at, attempts)
            .await?;
        Ok(())
    }

    async fn escalate(&self, err: &Error) {
        let decision = self.supervisor.on_unrecoverable_failure(err).await;
        info!("[Scheduler] Supervisor decision: {:?}", decision);
    }
}
