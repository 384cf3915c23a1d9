use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use super::model::{EnqueueOutcome, ExistingWorkPolicy, WorkItem, WorkName, WorkRequest};
use crate::errors::Result;

/// Durable work collaborator: at-least-once, possibly delayed execution that
/// survives reboot. Every mutation is committed before it resolves.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn enqueue(
        &self,
        request: WorkRequest,
        now: DateTime<Utc>,
        policy: ExistingWorkPolicy,
    ) -> Result<EnqueueOutcome>;

    /// Returns whether a pending item was removed.
    async fn cancel(&self, name: WorkName) -> Result<bool>;

    async fn get(&self, name: WorkName) -> Result<Option<WorkItem>>;

    async fn list_pending(&self) -> Result<Vec<WorkItem>>;

    /// Items with `run_at <= now`, oldest first.
    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<WorkItem>>;

    /// Removes the item only if it is still the generation `id`.
    async fn complete(&self, name: WorkName, id: &str) -> Result<bool>;

    async fn retry(
        &self,
        name: WorkName,
        id: &str,
        run_at: DateTime<Utc>,
        attempts: i32,
    ) -> Result<bool>;

    /// Moves every pending run time by `delta`.
    async fn shift_all(&self, delta: Duration) -> Result<usize>;
}
