use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use log::debug;

use devicelock_core::scheduler::{
    EnqueueOutcome, ExistingWorkPolicy, WorkItem, WorkName, WorkQueue, WorkRequest,
};
use devicelock_core::Result;

use super::model::WorkItemDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::work_items;
use crate::schema::work_items::dsl::*;

/// Durable named work, one pending item per name.
pub struct WorkQueueRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl WorkQueueRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        WorkQueueRepository { pool, writer }
    }

    fn find(conn: &mut SqliteConnection, work_name: WorkName) -> Result<Option<WorkItem>> {
        work_items
            .find(work_name.as_str())
            .select(WorkItemDB::as_select())
            .first::<WorkItemDB>(conn)
            .optional()
            .map_err(StorageError::from)?
            .map(WorkItemDB::into_domain)
            .transpose()
    }

    fn load_ordered(rows: Vec<WorkItemDB>) -> Result<Vec<WorkItem>> {
        rows.into_iter().map(WorkItemDB::into_domain).collect()
    }
}

#[async_trait]
impl WorkQueue for WorkQueueRepository {
    async fn enqueue(
        &self,
        request: WorkRequest,
        now: DateTime<Utc>,
        policy: ExistingWorkPolicy,
    ) -> Result<EnqueueOutcome> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<EnqueueOutcome> {
                if policy == ExistingWorkPolicy::Keep {
                    if let Some(existing) = Self::find(conn, request.name)? {
                        return Ok(EnqueueOutcome::Kept(existing));
                    }
                }
                let item = WorkItem::from_request(request, now);
                diesel::replace_into(work_items::table)
                    .values(&WorkItemDB::from_domain(&item)?)
                    .execute(conn)
                    .map_err(StorageError::from)?;
                debug!("[Storage] Enqueued {} ({}) at {}", item.name, item.id, item.run_at);
                Ok(EnqueueOutcome::Enqueued(item))
            })
            .await
    }

    async fn cancel(&self, work_name: WorkName) -> Result<bool> {
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<bool> {
                let removed = diesel::delete(work_items.find(work_name.as_str()))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(removed > 0)
            })
            .await
    }

    async fn get(&self, work_name: WorkName) -> Result<Option<WorkItem>> {
        let mut conn = get_connection(&self.pool)?;
        Self::find(&mut conn, work_name)
    }

    async fn list_pending(&self) -> Result<Vec<WorkItem>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = work_items
            .order((run_at_ms.asc(), name.asc()))
            .select(WorkItemDB::as_select())
            .load::<WorkItemDB>(&mut conn)
            .map_err(StorageError::from)?;
        Self::load_ordered(rows)
    }

    async fn list_due(&self, now: DateTime<Utc>) -> Result<Vec<WorkItem>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = work_items
            .filter(run_at_ms.le(now.timestamp_millis()))
            .order((run_at_ms.asc(), name.asc()))
            .select(WorkItemDB::as_select())
            .load::<WorkItemDB>(&mut conn)
            .map_err(StorageError::from)?;
        Self::load_ordered(rows)
    }

    async fn complete(&self, work_name: WorkName, item_id: &str) -> Result<bool> {
        let item_id = item_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<bool> {
                let removed = diesel::delete(
                    work_items
                        .filter(name.eq(work_name.as_str()))
                        .filter(id.eq(&item_id)),
                )
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(removed > 0)
            })
            .await
    }

    async fn retry(
        &self,
        work_name: WorkName,
        item_id: &str,
        next_run_at: DateTime<Utc>,
        next_attempts: i32,
    ) -> Result<bool> {
        let item_id = item_id.to_string();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<bool> {
                let updated = diesel::update(
                    work_items
                        .filter(name.eq(work_name.as_str()))
                        .filter(id.eq(&item_id)),
                )
                .set((
                    run_at_ms.eq(next_run_at.timestamp_millis()),
                    attempts.eq(next_attempts),
                ))
                .execute(conn)
                .map_err(StorageError::from)?;
                Ok(updated > 0)
            })
            .await
    }

    async fn shift_all(&self, delta: Duration) -> Result<usize> {
        let delta_ms = delta.num_milliseconds();
        self.writer
            .exec(move |conn: &mut SqliteConnection| -> Result<usize> {
                let shifted = diesel::update(work_items::table)
                    .set(run_at_ms.eq(run_at_ms + delta_ms))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(shifted)
            })
            .await
    }
}
